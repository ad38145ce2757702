use crate::api::AcademyClient;
use crate::export;
use crate::ingest;
use crate::ledger::FeeStatement;
use crate::models::NotificationLevel;
use crate::ui::render::render_ui;
use crate::ui::state::{AppState, FeeCalculatorForm, UploadForm, MENU_ITEMS};
use anyhow::Result;
use chrono::Local;
use crossterm::{
    event::{
        self, DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture,
        Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::path::PathBuf;
use tracing::{error, info};

pub struct App {
    client: AcademyClient,
    export_dir: PathBuf,
    state: AppState,
    /// Form contents of a failed upload, restored when the user goes back.
    last_upload_form: Option<UploadForm>,
}

impl App {
    pub fn new(client: AcademyClient, export_dir: PathBuf) -> Self {
        Self {
            client,
            export_dir,
            state: AppState::MainMenu { selected_index: 0 },
            last_upload_form: None,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        // Setup terminal
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(
            stdout,
            EnterAlternateScreen,
            EnableMouseCapture,
            EnableBracketedPaste
        )?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        // Main event loop
        let result = self.event_loop(&mut terminal).await;

        // Restore terminal
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture,
            DisableBracketedPaste
        )?;
        terminal.show_cursor()?;

        result
    }

    async fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> Result<()> {
        loop {
            // Always redraw the UI
            terminal.draw(|f| render_ui(f, &self.state))?;

            // Network work runs after the loading screen has been drawn
            self.run_pending().await;

            // Check for input events with a short timeout
            if event::poll(std::time::Duration::from_millis(50))? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        if self.handle_key_event(key).await? {
                            break; // User quit
                        }
                    }
                    Event::Paste(text) => self.handle_paste(&text),
                    _ => {}
                }
            }

            // Small yield to allow other async tasks to run
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        Ok(())
    }

    async fn run_pending(&mut self) {
        let pending = match &self.state {
            AppState::LoadingFees { student_id } => Some(Pending::Fees(student_id.clone())),
            AppState::UploadResults { form } if form.loading => Some(Pending::Upload(form.clone())),
            _ => None,
        };

        match pending {
            Some(Pending::Fees(student_id)) => self.load_fees(&student_id).await,
            Some(Pending::Upload(form)) => self.upload(form).await,
            None => {}
        }
    }

    async fn load_fees(&mut self, student_id: &str) {
        match self.client.get_student_fees(student_id).await {
            Ok(record) => {
                let statement = FeeStatement::build(&record, Local::now().date_naive());
                info!(student_id, installments = statement.lines.len(), "fee statement loaded");
                self.state = AppState::FeeStatementView {
                    statement,
                    selected_index: 0,
                    export_message: None,
                };
            }
            Err(e) => {
                error!(student_id, error = %format!("{:#}", e), "failed to load fees");
                self.state = AppState::Error {
                    message: format!("{:#}", e),
                };
            }
        }
    }

    async fn upload(&mut self, mut form: UploadForm) {
        let outcome = ingest::upload_results(&self.client, &form.request()).await;
        let notification = ingest::notify(&outcome);

        match outcome {
            Ok(summary) => {
                self.state = AppState::UploadComplete {
                    notification,
                    summary: Some(summary),
                    export_message: None,
                };
            }
            Err(e) => {
                error!(error = %e, "result upload failed");
                // Keep what the user typed so they can fix it and retry
                form.finish_submit();
                self.state = AppState::UploadComplete {
                    notification,
                    summary: None,
                    export_message: None,
                };
                self.last_upload_form = Some(form);
            }
        }
    }

    fn handle_paste(&mut self, text: &str) {
        if let AppState::UploadResults { form } = &mut self.state {
            form.paste(text);
        }
    }

    async fn handle_key_event(&mut self, key: KeyEvent) -> Result<bool> {
        let current_state = std::mem::replace(&mut self.state, AppState::MainMenu { selected_index: 0 });

        match current_state {
            AppState::MainMenu { mut selected_index } => match key.code {
                KeyCode::Char('q') => return Ok(true),
                KeyCode::Up => {
                    selected_index = selected_index.saturating_sub(1);
                    self.state = AppState::MainMenu { selected_index };
                }
                KeyCode::Down => {
                    if selected_index < MENU_ITEMS.len() - 1 {
                        selected_index += 1;
                    }
                    self.state = AppState::MainMenu { selected_index };
                }
                KeyCode::Enter => match selected_index {
                    0 => {
                        self.state = AppState::StudentLookup {
                            student_id: String::new(),
                        }
                    }
                    1 => {
                        self.state = AppState::FeeCalculator {
                            form: FeeCalculatorForm::default(),
                        }
                    }
                    2 => {
                        self.state = AppState::UploadResults {
                            form: self.last_upload_form.take().unwrap_or_default(),
                        }
                    }
                    _ => return Ok(true),
                },
                _ => self.state = AppState::MainMenu { selected_index },
            },
            AppState::StudentLookup { mut student_id } => match key.code {
                KeyCode::Esc => self.state = AppState::MainMenu { selected_index: 0 },
                KeyCode::Enter if !student_id.trim().is_empty() => {
                    self.state = AppState::LoadingFees {
                        student_id: student_id.trim().to_string(),
                    };
                }
                KeyCode::Char(c) => {
                    if student_id.len() < 64 {
                        student_id.push(c);
                    }
                    self.state = AppState::StudentLookup { student_id };
                }
                KeyCode::Backspace => {
                    student_id.pop();
                    self.state = AppState::StudentLookup { student_id };
                }
                _ => self.state = AppState::StudentLookup { student_id },
            },
            AppState::FeeStatementView {
                statement,
                mut selected_index,
                export_message,
            } => match key.code {
                KeyCode::Char('q') => return Ok(true),
                KeyCode::Esc => self.state = AppState::MainMenu { selected_index: 0 },
                KeyCode::Char('r') => {
                    self.state = AppState::LoadingFees {
                        student_id: statement.student.id.clone(),
                    };
                }
                KeyCode::Char('e') => {
                    let export_message = match export::export_fee_statement(&statement, &self.export_dir) {
                        Ok(path) => format!("Saved {}", path.display()),
                        Err(e) => format!("Export failed: {:#}", e),
                    };
                    self.state = AppState::FeeStatementView {
                        statement,
                        selected_index,
                        export_message: Some(export_message),
                    };
                }
                KeyCode::Up => {
                    selected_index = selected_index.saturating_sub(1);
                    self.state = AppState::FeeStatementView {
                        statement,
                        selected_index,
                        export_message,
                    };
                }
                KeyCode::Down => {
                    if selected_index < statement.lines.len().saturating_sub(1) {
                        selected_index += 1;
                    }
                    self.state = AppState::FeeStatementView {
                        statement,
                        selected_index,
                        export_message,
                    };
                }
                _ => {
                    self.state = AppState::FeeStatementView {
                        statement,
                        selected_index,
                        export_message,
                    };
                }
            },
            AppState::FeeCalculator { mut form } => match key.code {
                KeyCode::Esc => self.state = AppState::MainMenu { selected_index: 1 },
                KeyCode::Tab | KeyCode::BackTab => {
                    form.toggle_field();
                    self.state = AppState::FeeCalculator { form };
                }
                KeyCode::Char(c) => {
                    form.push_digit(c);
                    self.state = AppState::FeeCalculator { form };
                }
                KeyCode::Backspace => {
                    form.pop();
                    self.state = AppState::FeeCalculator { form };
                }
                _ => self.state = AppState::FeeCalculator { form },
            },
            AppState::UploadResults { mut form } => {
                match key.code {
                    KeyCode::Esc if !form.loading => {
                        self.state = AppState::MainMenu { selected_index: 2 };
                        return Ok(false);
                    }
                    KeyCode::Tab => form.next_field(),
                    KeyCode::BackTab => form.previous_field(),
                    KeyCode::Enter => {
                        // Ignored while a submission is already running
                        form.begin_submit();
                    }
                    KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        form.clear_field()
                    }
                    KeyCode::Char(c) => form.push_char(c),
                    KeyCode::Backspace => form.pop_char(),
                    _ => {}
                }
                self.state = AppState::UploadResults { form };
            }
            AppState::UploadComplete {
                notification,
                summary,
                export_message,
            } => match key.code {
                KeyCode::Char('q') => return Ok(true),
                KeyCode::Char('e') if summary.as_ref().is_some_and(|s| s.has_problems()) => {
                    let export_message = summary.as_ref().map(|s| {
                        match export::export_rejections(
                            &s.test_id,
                            &s.response.rejections,
                            &s.skipped,
                            &self.export_dir,
                        ) {
                            Ok(path) => format!("Saved {}", path.display()),
                            Err(e) => format!("Export failed: {:#}", e),
                        }
                    });
                    self.state = AppState::UploadComplete {
                        notification,
                        summary,
                        export_message,
                    };
                }
                KeyCode::Enter | KeyCode::Esc => {
                    self.state = if notification.level == NotificationLevel::Error {
                        // Back to the form to fix the input
                        AppState::UploadResults {
                            form: self.last_upload_form.take().unwrap_or_default(),
                        }
                    } else {
                        AppState::MainMenu { selected_index: 2 }
                    };
                }
                _ => {
                    self.state = AppState::UploadComplete {
                        notification,
                        summary,
                        export_message,
                    };
                }
            },
            AppState::Error { message } => match key.code {
                KeyCode::Char('q') => return Ok(true),
                KeyCode::Enter | KeyCode::Esc => self.state = AppState::MainMenu { selected_index: 0 },
                _ => self.state = AppState::Error { message },
            },
            state => {
                // LoadingFees ignores input until the request returns
                self.state = state;
            }
        }
        Ok(false)
    }
}

enum Pending {
    Fees(String),
    Upload(UploadForm),
}

