use crate::models::{OrganizingRule, RuleSet};

/// Dotted, lower-cased extension of a file name: `"Report.PDF"` → `".pdf"`.
///
/// Returns `None` for names without a suffix, including dotfiles like `.bashrc`
/// and names ending in a bare dot.
pub fn extension_of(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(format!(".{}", ext.to_lowercase()))
}

/// First enabled rule, in list order, whose extension list contains `extension`
pub fn classify<'a>(rules: &'a RuleSet, extension: &str) -> Option<&'a OrganizingRule> {
    rules.first_match(extension)
}

/// Classify a file by name; `None` means the file stays where it is
pub fn classify_file<'a>(rules: &'a RuleSet, file_name: &str) -> Option<&'a OrganizingRule> {
    let extension = extension_of(file_name)?;
    classify(rules, &extension)
}
