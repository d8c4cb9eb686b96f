/// Shorten `text` to at most `max` characters, splicing in `placeholder`
/// where characters were removed.
///
/// With `from_start` the beginning is cut and the tail kept
/// (`"...world"`); otherwise the head is kept (`"hello..."`). Text that
/// already fits is returned unchanged.
pub fn truncate(text: &str, max: usize, placeholder: &str, from_start: bool) -> String {
    let len = text.chars().count();
    if len <= max {
        return text.to_string();
    }

    let placeholder_len = placeholder.chars().count();
    if placeholder_len >= max {
        return placeholder.chars().take(max).collect();
    }

    let keep = max - placeholder_len;
    if from_start {
        let tail: String = text.chars().skip(len - keep).collect();
        format!("{}{}", placeholder, tail)
    } else {
        let head: String = text.chars().take(keep).collect();
        format!("{}{}", head, placeholder)
    }
}
