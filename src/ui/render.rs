use crate::ledger::FeeStatement;
use crate::models::{InstallmentStatus, IngestSummary, Notification, NotificationLevel};
use crate::ui::state::{
    AppState, CalculatorField, FeeCalculatorForm, UploadField, UploadForm, MENU_ITEMS,
};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Row, Table, Wrap},
    Frame,
};

const TITLE: &str = "Academy Desk";

pub fn render_ui(frame: &mut Frame, state: &AppState) {
    match state {
        AppState::MainMenu { selected_index } => render_main_menu(frame, *selected_index),
        AppState::StudentLookup { student_id } => render_student_lookup(frame, student_id),
        AppState::LoadingFees { student_id } => {
            render_loading(frame, &format!("Loading fees for {}...", student_id))
        }
        AppState::FeeStatementView {
            statement,
            selected_index,
            export_message,
        } => render_fee_statement(frame, statement, *selected_index, export_message.as_deref()),
        AppState::FeeCalculator { form } => render_fee_calculator(frame, form),
        AppState::UploadResults { form } => render_upload_form(frame, form),
        AppState::UploadComplete {
            notification,
            summary,
            export_message,
        } => render_upload_complete(frame, notification, summary.as_ref(), export_message.as_deref()),
        AppState::Error { message } => render_error(frame, message),
    }
}

fn selected_style(selected: bool) -> Style {
    if selected {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    }
}

fn bordered(title: &str) -> Block<'_> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
}

fn help_bar(text: &str) -> Paragraph<'_> {
    Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center)
}

fn format_amount(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if amount < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

fn render_loading(frame: &mut Frame, message: &str) {
    let paragraph = Paragraph::new(message)
        .block(bordered(TITLE))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });

    frame.render_widget(paragraph, frame.area());
}

fn render_main_menu(frame: &mut Frame, selected_index: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(frame.area());

    let items: Vec<ListItem> = MENU_ITEMS
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let prefix = if i == selected_index { "> " } else { "  " };
            ListItem::new(format!("{}{}", prefix, item)).style(selected_style(i == selected_index))
        })
        .collect();

    frame.render_widget(List::new(items).block(bordered(TITLE)), chunks[0]);
    frame.render_widget(help_bar("[↑↓: Navigate | Enter: Select | q: Quit]"), chunks[1]);
}

fn render_student_lookup(frame: &mut Frame, student_id: &str) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let input = Paragraph::new(format!("Student ID: {}_", student_id))
        .block(bordered("Student Fees").border_style(selected_style(true)));

    frame.render_widget(input, chunks[0]);
    frame.render_widget(help_bar("[Enter: Load | Esc: Back]"), chunks[2]);
}

fn status_color(status: InstallmentStatus) -> Color {
    match status {
        InstallmentStatus::Paid => Color::Green,
        InstallmentStatus::Partial => Color::Yellow,
        InstallmentStatus::Pending => Color::White,
        InstallmentStatus::Overdue => Color::Red,
    }
}

fn render_fee_statement(
    frame: &mut Frame,
    statement: &FeeStatement,
    selected_index: usize,
    export_message: Option<&str>,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(8),
            Constraint::Min(5),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let bold = Style::default().add_modifier(Modifier::BOLD);
    let student = &statement.student;
    let mut summary = vec![
        Line::from(vec![
            Span::styled("Student: ", bold),
            Span::raw(format!(
                "{} ({})",
                student.name,
                student.roll_no.as_deref().unwrap_or(&student.id)
            )),
            Span::raw(
                student
                    .batch_name
                    .as_deref()
                    .map(|b| format!(" | Batch: {}", b))
                    .unwrap_or_default(),
            ),
        ]),
        Line::from(vec![
            Span::styled("Base fees: ", bold),
            Span::raw(format_amount(statement.base_fees)),
            Span::styled("  Discount: ", bold),
            Span::raw(format!(
                "{} ({:?})",
                format_amount(statement.discount_value),
                statement.discount_type
            )),
            Span::styled("  Final fees: ", bold),
            Span::raw(format_amount(statement.final_fees)),
        ]),
        Line::from(vec![
            Span::styled("Collected: ", bold),
            Span::styled(
                format_amount(statement.totals.total_collected),
                Style::default().fg(Color::Green),
            ),
            Span::styled("  Pending: ", bold),
            Span::styled(
                format_amount(statement.totals.total_pending),
                Style::default().fg(Color::Yellow),
            ),
            Span::styled("  Overdue: ", bold),
            Span::styled(
                format!(
                    "{} across {} installment(s)",
                    format_amount(statement.overdue_amount()),
                    statement.overdue_lines().count()
                ),
                Style::default().fg(Color::Red),
            ),
        ]),
    ];

    if let Some(next) = statement.next_due() {
        summary.push(Line::from(vec![
            Span::styled("Next due: ", bold),
            Span::raw(format!(
                "#{} on {}, {} pending",
                next.installment_no,
                next.due_date.format("%Y-%m-%d"),
                format_amount(next.pending)
            )),
        ]));
    }
    if statement.plan_mismatch != 0 {
        summary.push(Line::styled(
            format!(
                "Installments add up to {} {} final fees",
                format_amount(statement.plan_mismatch.abs()),
                if statement.plan_mismatch > 0 { "more than" } else { "less than" }
            ),
            Style::default().fg(Color::Magenta),
        ));
    }
    if statement.unallocated > 0 {
        summary.push(Line::styled(
            format!("{} received beyond the plan", format_amount(statement.unallocated)),
            Style::default().fg(Color::Magenta),
        ));
    }

    frame.render_widget(
        Paragraph::new(summary).block(bordered(&format!(
            "Fee Statement as of {}",
            statement.as_of.format("%Y-%m-%d")
        ))),
        chunks[0],
    );

    let header = Row::new(vec!["#", "Due", "Amount", "Paid", "Pending", "Paid on", "Status"])
        .style(bold);
    let rows: Vec<Row> = statement
        .lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let style = if i == selected_index {
                Style::default()
                    .fg(status_color(line.status))
                    .add_modifier(Modifier::REVERSED)
            } else {
                Style::default().fg(status_color(line.status))
            };
            Row::new(vec![
                line.installment_no.to_string(),
                line.due_date.format("%Y-%m-%d").to_string(),
                format_amount(line.amount),
                format_amount(line.paid),
                format_amount(line.pending),
                line.paid_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "-".to_string()),
                line.status.to_string(),
            ])
            .style(style)
        })
        .collect();

    let widths = [
        Constraint::Length(4),
        Constraint::Length(12),
        Constraint::Length(12),
        Constraint::Length(12),
        Constraint::Length(12),
        Constraint::Length(12),
        Constraint::Length(9),
    ];
    let table_title = if statement.lines.is_empty() {
        "Installments (no installment plan)"
    } else {
        "Installments"
    };
    let table = Table::new(rows, widths)
        .header(header)
        .block(bordered(table_title));

    frame.render_widget(table, chunks[1]);

    let help = match export_message {
        Some(message) => format!("{} | [e: Export | r: Refresh | Esc: Back | q: Quit]", message),
        None => "[↑↓: Navigate | e: Export CSV | r: Refresh | Esc: Back | q: Quit]".to_string(),
    };
    frame.render_widget(help_bar(&help), chunks[2]);
}

fn render_fee_calculator(frame: &mut Frame, form: &FeeCalculatorForm) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let base = Paragraph::new(format!("Base fees: {}_", form.base_input)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(selected_style(form.focused_field == CalculatorField::BaseFees)),
    );
    frame.render_widget(base, chunks[0]);

    let discount = Paragraph::new(format!("Discount: {}_", form.discount_input)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(selected_style(form.focused_field == CalculatorField::Discount)),
    );
    frame.render_widget(discount, chunks[1]);

    let result = Paragraph::new(Line::from(vec![
        Span::styled("Final fees: ", Style::default().add_modifier(Modifier::BOLD)),
        Span::styled(
            format_amount(form.final_fees()),
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        ),
    ]))
    .block(bordered("Fee Calculator"));
    frame.render_widget(result, chunks[2]);

    frame.render_widget(help_bar("[Tab: Switch Field | Esc: Back]"), chunks[4]);
}

fn render_upload_form(frame: &mut Frame, form: &UploadForm) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let field = |label: &str, value: &str, which: UploadField| {
        Paragraph::new(format!("{}: {}_", label, value)).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(selected_style(form.focused_field == which)),
        )
    };

    frame.render_widget(field("Test ID", &form.test_id, UploadField::TestId), chunks[0]);
    frame.render_widget(
        field("CSV file (optional)", &form.file_path, UploadField::FilePath),
        chunks[1],
    );

    let pasted = Paragraph::new(form.pasted.as_str())
        .block(
            Block::default()
                .title(format!(
                    "Pasted data ({} non-empty line(s)) - paste from a spreadsheet",
                    form.pasted_line_count()
                ))
                .borders(Borders::ALL)
                .border_style(selected_style(form.focused_field == UploadField::Pasted)),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(pasted, chunks[2]);

    let help = if form.loading {
        Paragraph::new("Uploading... please wait")
            .style(Style::default().fg(Color::Yellow))
            .block(Block::default().borders(Borders::ALL))
            .alignment(Alignment::Center)
    } else {
        help_bar("[Tab: Next Field | Enter: Upload | Ctrl+U: Clear Field | Esc: Back]")
    };
    frame.render_widget(help, chunks[3]);
}

fn notification_color(level: NotificationLevel) -> Color {
    match level {
        NotificationLevel::Success => Color::Green,
        NotificationLevel::Warning => Color::Yellow,
        NotificationLevel::Error => Color::Red,
    }
}

fn render_upload_complete(
    frame: &mut Frame,
    notification: &Notification,
    summary: Option<&IngestSummary>,
    export_message: Option<&str>,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(7),
            Constraint::Min(3),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let color = notification_color(notification.level);
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let mut text = vec![
        Line::from(Span::styled(
            notification.message.as_str(),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];
    if let Some(summary) = summary {
        text.push(Line::from(vec![
            Span::styled("Test: ", bold),
            Span::raw(summary.test_id.as_str()),
            Span::styled("  Sent: ", bold),
            Span::raw(summary.submitted.to_string()),
            Span::styled("  Verified: ", bold),
            Span::raw(format!(
                "{} ({:.1}%)",
                summary.response.verified,
                summary.verified_percentage()
            )),
            Span::styled("  Rejected: ", bold),
            Span::raw(summary.response.rejected.to_string()),
        ]));
    }

    frame.render_widget(
        Paragraph::new(text)
            .block(
                Block::default()
                    .title("Upload Results")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(color)),
            )
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true }),
        chunks[0],
    );

    let items: Vec<ListItem> = notification
        .details
        .iter()
        .map(|d| ListItem::new(format!("• {}", d)).style(Style::default().fg(color)))
        .collect();
    frame.render_widget(
        List::new(items).block(bordered("Rows needing attention")),
        chunks[1],
    );

    let can_export = summary.is_some_and(IngestSummary::has_problems);
    let help = match (export_message, can_export) {
        (Some(message), _) => format!("{} | [Enter: Continue | q: Quit]", message),
        (None, true) => "[e: Export Rejections | Enter: Continue | q: Quit]".to_string(),
        (None, false) => "[Enter: Continue | q: Quit]".to_string(),
    };
    frame.render_widget(help_bar(&help), chunks[2]);
}

fn render_error(frame: &mut Frame, message: &str) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(frame.area());

    let text = vec![
        Line::from(vec![Span::styled(
            "Error",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )]),
        Line::from(""),
        Line::from(message),
    ];

    let paragraph = Paragraph::new(text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red)),
        )
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });

    frame.render_widget(paragraph, chunks[0]);
    frame.render_widget(help_bar("[Enter: Continue | q: Quit]"), chunks[1]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount_groups_thousands() {
        assert_eq!(format_amount(0), "0");
        assert_eq!(format_amount(999), "999");
        assert_eq!(format_amount(45000), "45,000");
        assert_eq!(format_amount(1234567), "1,234,567");
        assert_eq!(format_amount(-2500), "-2,500");
    }
}
