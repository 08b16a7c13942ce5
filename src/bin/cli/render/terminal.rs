use moneymate_lib::catalog::Document;
use moneymate_lib::format::{format_date, format_file_size_str, institution_type_label};

/// ANSI color codes
pub struct Color;

impl Color {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const CYAN: &str = "\x1b[36m";
}

pub fn paint(text: &str, color: &str, use_color: bool) -> String {
    if use_color {
        format!("{}{}{}", color, text, Color::RESET)
    } else {
        text.to_string()
    }
}

/// One line per document for list output
pub fn document_line(doc: &Document, use_color: bool) -> String {
    format!(
        "{:>6}  {}  {} {}",
        doc.id,
        paint(&doc.institution_name, Color::BOLD, use_color),
        doc.title,
        paint(
            &format!("[{}] {}", doc.document_type, format_date(&doc.updated_at)),
            Color::DIM,
            use_color
        ),
    )
}

/// Full detail block for `show`
pub fn document_detail(doc: &Document, use_color: bool) -> String {
    let mut lines = vec![paint(&doc.title, Color::BOLD, use_color)];

    let mut field = |label: &str, value: String| {
        lines.push(format!("{} {}", paint(&format!("{:<12}", label), Color::CYAN, use_color), value));
    };
    field("ID", doc.id.clone());
    field("Institution", doc.institution_name.clone());
    field("Type", institution_type_label(doc.institution_type).to_string());
    field("Document", doc.document_type.clone());
    field("Updated", format_date(&doc.updated_at));
    field("Size", format_file_size_str(&doc.file_size));
    field("File", doc.file_url.clone());

    if let Some(description) = doc.description.as_deref().filter(|d| !d.is_empty()) {
        lines.push(String::new());
        lines.push(description.to_string());
    }

    lines.join("\n")
}
