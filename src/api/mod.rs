mod academy;

pub use academy::AcademyClient;
