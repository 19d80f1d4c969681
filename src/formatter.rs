//! Display helpers over a [`DirectoryRecord`].
//!
//! Everything here is pure: no I/O and no mutation of the record.

use crate::record::{
    CAMPUS_ADDRESS, CAMPUS_PHONE, COMMON_NAME, DirectoryRecord,
    PUBLISHED_EMAIL,
};

const LINE_BREAK: &str = "<br />";

/// Compose the display text for a record.
///
/// Campus address, email link and phone, in that order. A missing or empty
/// field adds nothing, not even its line break.
pub fn format_as_display_text(record: &DirectoryRecord) -> String {
    let mut markup = String::new();

    if let Some(address) = non_empty(campus_address(record)) {
        markup.push_str(address);
        markup.push_str(LINE_BREAK);
    }

    if let Some(email) = non_empty(email(record)) {
        markup.push_str(&format!(r#"<a href="mailto:{email}">{email}</a>"#));
        markup.push_str(LINE_BREAK);
    }

    if let Some(phone) = non_empty(phone(record)) {
        markup.push_str(phone);
        markup.push_str(LINE_BREAK);
    }

    markup
}

/// Value at `index` for `attribute` on the first entry.
///
/// `None` means the entry, attribute or index does not exist. A present
/// but empty value is returned as `Some("")`.
pub fn get_field<'a>(
    record: &'a DirectoryRecord,
    attribute: &str,
    index: usize,
) -> Option<&'a str> {
    record.first().and_then(|entry| entry.value(attribute, index))
}

/// Common name (`cn`).
pub fn common_name(record: &DirectoryRecord) -> Option<&str> {
    get_field(record, COMMON_NAME, 0)
}

pub fn campus_address(record: &DirectoryRecord) -> Option<&str> {
    get_field(record, CAMPUS_ADDRESS, 0)
}

/// Published email address.
pub fn email(record: &DirectoryRecord) -> Option<&str> {
    get_field(record, PUBLISHED_EMAIL, 0)
}

pub fn phone(record: &DirectoryRecord) -> Option<&str> {
    get_field(record, CAMPUS_PHONE, 0)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
