use crate::ingest::UploadRequest;
use crate::ledger::{compute_final_fees, FeeStatement};
use crate::models::{Amount, IngestSummary, Notification};
use std::path::PathBuf;

pub const MENU_ITEMS: [&str; 4] = [
    "Student Fees",
    "Fee Calculator",
    "Upload Test Results",
    "Quit",
];

#[derive(Debug, Clone)]
pub enum AppState {
    MainMenu {
        selected_index: usize,
    },
    StudentLookup {
        student_id: String,
    },
    LoadingFees {
        student_id: String,
    },
    FeeStatementView {
        statement: FeeStatement,
        selected_index: usize,
        export_message: Option<String>,
    },
    FeeCalculator {
        form: FeeCalculatorForm,
    },
    UploadResults {
        form: UploadForm,
    },
    UploadComplete {
        notification: Notification,
        summary: Option<IngestSummary>,
        export_message: Option<String>,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalculatorField {
    BaseFees,
    Discount,
}

/// Final fees follow the two inputs on every keystroke.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeCalculatorForm {
    pub base_input: String,
    pub discount_input: String,
    pub focused_field: CalculatorField,
}

impl Default for FeeCalculatorForm {
    fn default() -> Self {
        Self {
            base_input: String::new(),
            discount_input: String::new(),
            focused_field: CalculatorField::BaseFees,
        }
    }
}

impl FeeCalculatorForm {
    pub fn push_digit(&mut self, c: char) {
        if !c.is_ascii_digit() {
            return;
        }
        let field = self.focused_mut();
        // 15 digits stays well inside i64
        if field.len() < 15 {
            field.push(c);
        }
    }

    pub fn pop(&mut self) {
        self.focused_mut().pop();
    }

    pub fn toggle_field(&mut self) {
        self.focused_field = match self.focused_field {
            CalculatorField::BaseFees => CalculatorField::Discount,
            CalculatorField::Discount => CalculatorField::BaseFees,
        };
    }

    pub fn base_fees(&self) -> Amount {
        self.base_input.parse().unwrap_or(0)
    }

    pub fn discount(&self) -> Amount {
        self.discount_input.parse().unwrap_or(0)
    }

    pub fn final_fees(&self) -> Amount {
        compute_final_fees(self.base_fees(), self.discount())
    }

    fn focused_mut(&mut self) -> &mut String {
        match self.focused_field {
            CalculatorField::BaseFees => &mut self.base_input,
            CalculatorField::Discount => &mut self.discount_input,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UploadField {
    TestId,
    FilePath,
    Pasted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadForm {
    pub test_id: String,
    pub file_path: String,
    pub pasted: String,
    pub focused_field: UploadField,
    /// Set while a submission is in flight; further submits are ignored.
    pub loading: bool,
}

impl Default for UploadForm {
    fn default() -> Self {
        Self {
            test_id: String::new(),
            file_path: String::new(),
            pasted: String::new(),
            focused_field: UploadField::TestId,
            loading: false,
        }
    }
}

impl UploadForm {
    pub fn next_field(&mut self) {
        self.focused_field = match self.focused_field {
            UploadField::TestId => UploadField::FilePath,
            UploadField::FilePath => UploadField::Pasted,
            UploadField::Pasted => UploadField::TestId,
        };
    }

    pub fn previous_field(&mut self) {
        self.focused_field = match self.focused_field {
            UploadField::TestId => UploadField::Pasted,
            UploadField::FilePath => UploadField::TestId,
            UploadField::Pasted => UploadField::FilePath,
        };
    }

    pub fn push_char(&mut self, c: char) {
        if self.loading {
            return;
        }
        self.focused_mut().push(c);
    }

    pub fn pop_char(&mut self) {
        if self.loading {
            return;
        }
        self.focused_mut().pop();
    }

    pub fn clear_field(&mut self) {
        if self.loading {
            return;
        }
        self.focused_mut().clear();
    }

    /// Bracketed paste. Multi-line text always lands in the data area;
    /// single-line fields only take the first line.
    pub fn paste(&mut self, text: &str) {
        if self.loading {
            return;
        }
        let text = text.replace("\r\n", "\n").replace('\r', "\n");
        match self.focused_field {
            UploadField::Pasted => self.pasted.push_str(&text),
            _ if text.contains('\n') => {
                self.focused_field = UploadField::Pasted;
                self.pasted.push_str(&text);
            }
            _ => self.focused_mut().push_str(text.trim()),
        }
    }

    /// Mark the form as submitting. Returns `false` if a submission is already running.
    pub fn begin_submit(&mut self) -> bool {
        if self.loading {
            return false;
        }
        self.loading = true;
        true
    }

    pub fn finish_submit(&mut self) {
        self.loading = false;
    }

    pub fn request(&self) -> UploadRequest {
        let file_path = self.file_path.trim();
        UploadRequest {
            test_id: self.test_id.trim().to_string(),
            file: (!file_path.is_empty()).then(|| PathBuf::from(file_path)),
            pasted: self.pasted.clone(),
        }
    }

    pub fn pasted_line_count(&self) -> usize {
        self.pasted.lines().filter(|l| !l.trim().is_empty()).count()
    }

    fn focused_mut(&mut self) -> &mut String {
        match self.focused_field {
            UploadField::TestId => &mut self.test_id,
            UploadField::FilePath => &mut self.file_path,
            UploadField::Pasted => &mut self.pasted,
        }
    }
}
