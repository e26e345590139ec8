use std::collections::HashSet;

/// Strips every HTML tag and returns plain text, for titles and labels.
/// Entities produced by the cleaner are decoded again so the stored value is
/// the literal text; templates escape it on output.
pub fn strip_all_html(input: &str) -> String {
    let cleaned = ammonia::Builder::new()
        .tags(HashSet::new())
        .clean(input)
        .to_string();
    html_escape::decode_html_entities(&cleaned).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_removed_text_kept() {
        assert_eq!(strip_all_html("<b>Bold</b> move"), "Bold move");
        assert_eq!(strip_all_html("<script>alert(1)</script>Clip"), "Clip");
    }

    #[test]
    fn plain_text_survives_unescaped() {
        assert_eq!(strip_all_html("Tom & Jerry"), "Tom & Jerry");
        assert_eq!(strip_all_html("5 > 3"), "5 > 3");
    }
}
