use crate::models::AppSettings;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Za-z0-9])[A-Za-z0-9+_.\-]*@([A-Za-z0-9\-]+(?:\.[A-Za-z0-9\-]+)*)").expect("valid regex")
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayOptions {
    pub upper_case: bool,
    pub mask_emails: bool,
}

impl DisplayOptions {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            upper_case: settings.upper_case_details,
            mask_emails: settings.mask_emails,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedDetails {
    pub content: String,
    pub masked_count: usize,
}

pub fn upper_case(details: &str) -> String {
    details.to_uppercase()
}

/// Keeps the first character of each address's local part: `a***@example.com`.
pub fn mask_emails(details: &str) -> String {
    EMAIL_PATTERN.replace_all(details, "$1***@$2").into_owned()
}

/// Applies the enabled formatters. Masking runs first so it sees the original casing.
pub fn render(details: &str, options: &DisplayOptions) -> RenderedDetails {
    if details.is_empty() {
        return RenderedDetails {
            content: String::new(),
            masked_count: 0,
        };
    }

    let mut content = details.to_string();
    let mut masked_count = 0usize;

    if options.mask_emails {
        masked_count = EMAIL_PATTERN.find_iter(&content).count();
        if masked_count > 0 {
            content = mask_emails(&content);
        }
    }
    if options.upper_case {
        content = upper_case(&content);
    }

    RenderedDetails { content, masked_count }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAILS: &str = "Name: Ann Lee\nEmails:\n  - Personal: ann.lee@example.com\n  - Work: a@corp.example\n";

    #[test]
    fn masks_every_address() {
        let masked = mask_emails(DETAILS);
        assert!(masked.contains("Personal: a***@example.com"));
        assert!(masked.contains("Work: a***@corp.example"));
        assert!(!masked.contains("ann.lee@"));
    }

    #[test]
    fn formatters_compose() {
        let rendered = render(
            DETAILS,
            &DisplayOptions {
                upper_case: true,
                mask_emails: true,
            },
        );
        assert_eq!(rendered.masked_count, 2);
        assert!(rendered.content.starts_with("NAME: ANN LEE"));
        assert!(rendered.content.contains("A***@EXAMPLE.COM"));
    }

    #[test]
    fn default_options_leave_details_untouched() {
        let rendered = render(DETAILS, &DisplayOptions::default());
        assert_eq!(rendered.content, DETAILS);
        assert_eq!(rendered.masked_count, 0);
    }

    #[test]
    fn options_follow_settings() {
        let settings = AppSettings {
            mask_emails: true,
            ..AppSettings::default()
        };
        let options = DisplayOptions::from_settings(&settings);
        assert!(options.mask_emails);
        assert!(!options.upper_case);
    }
}
