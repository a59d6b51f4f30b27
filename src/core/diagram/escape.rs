//! Text helpers shared by the synthesizer and the filter.

/// Escape user text for use inside a quoted node label
pub fn escape_label(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '"' => out.push('\''),
            '&' => out.push_str("#38;"),
            '<' => out.push_str("#lt;"),
            '>' => out.push_str("#gt;"),
            '[' => out.push_str("#91;"),
            ']' => out.push_str("#93;"),
            '*' => out.push_str("#42;"),
            '+' => out.push_str("#43;"),
            '-' => out.push_str("#45;"),
            '|' => out.push_str("#124;"),
            '\n' | '\r' => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}

/// Minimal escaping for a label that has already been through `escape_label`
/// once: keeps it inside its quotes and free of raw `&`
pub fn canonical_label(text: &str) -> String {
    text.replace('"', "'").replace('&', "#38;").replace(['\n', '\r'], " ")
}

/// Turn the `#lt;`-style codes of an escaped label back into characters
pub fn unescape_label(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('#') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match tail.find(';').and_then(|end| decode_code(&tail[1..end]).map(|c| (c, end))) {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('#');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_code(code: &str) -> Option<char> {
    match code {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "amp" => Some('&'),
        _ if !code.is_empty() && code.len() <= 7 && code.chars().all(|c| c.is_ascii_digit()) => {
            code.parse::<u32>().ok().and_then(char::from_u32)
        }
        _ => None,
    }
}

/// Decode HTML entities (`&lt;`, `&gt;`, `&amp;`, `&quot;`, `&#39;`, `&#NN;`) once
pub fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let decoded = tail.find(';').filter(|&end| end <= 10).and_then(|end| {
            let name = &tail[1..end];
            let c = match name {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "amp" => Some('&'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => name
                    .strip_prefix('#')
                    .filter(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
                    .and_then(|digits| digits.parse::<u32>().ok())
                    .and_then(char::from_u32),
            };
            c.map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Identifier-safe form of a function id: `coin::split` -> `coin__split`
pub fn sanitize_id(id: &str) -> String {
    let sanitized: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if sanitized.is_empty() {
        "node".to_string()
    } else {
        sanitized
    }
}

/// Classification as a node-id suffix: lowercase, no underscores
pub fn tag_of(classification: &str) -> String {
    let tag: String = classification
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if tag.is_empty() {
        "regular".to_string()
    } else {
        tag
    }
}

/// The classification suffix of a rendered node id, if it has one
pub fn tag_suffix(node_id: &str) -> Option<&str> {
    node_id.rsplit_once('_').map(|(_, tag)| tag).filter(|tag| !tag.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_label_table() {
        assert_eq!(escape_label(r#"say "hi""#), "say 'hi'");
        assert_eq!(escape_label("a<b>&c"), "a#lt;b#gt;#38;c");
        assert_eq!(escape_label("x[0]*2+1-y|z"), "x#91;0#93;#42;2#43;1#45;y#124;z");
        assert_eq!(escape_label("two\nlines"), "two lines");
    }

    #[test]
    fn test_unescape_reverses_codes() {
        let original = "transfer(to: Map<Address, Int>) - [x]";
        assert_eq!(unescape_label(&escape_label(original)), original);
        assert_eq!(unescape_label("#notacode; #"), "#notacode; #");
    }

    #[test]
    fn test_decode_entities_once() {
        assert_eq!(decode_entities("a &lt; b &amp;&amp; c &gt; d"), "a < b && c > d");
        assert_eq!(decode_entities("&quot;x&quot; &#39;y&#39; &#65;"), "\"x\" 'y' A");
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
        assert_eq!(decode_entities("fish & chips"), "fish & chips");
    }

    #[test]
    fn test_ids_and_tags() {
        assert_eq!(sanitize_id("coin::split"), "coin__split");
        assert_eq!(sanitize_id("get-balance?"), "get_balance_");
        assert_eq!(sanitize_id(""), "node");
        assert_eq!(tag_of("method_id"), "methodid");
        assert_eq!(tag_of("Entry"), "entry");
        assert_eq!(tag_suffix("coin__split_external"), Some("external"));
        assert_eq!(tag_suffix("A"), None);
    }
}
