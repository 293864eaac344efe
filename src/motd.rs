use serde::Serialize;
use serde_json::{Map, Value};

const SECTION_SIGN: char = '§';
const RESET_CODE: char = 'r';

/// A legacy colour code with its chat component name and HTML colour.
#[derive(Debug, Clone, Copy)]
pub struct ColorCode {
    pub code: char,
    pub name: &'static str,
    pub hex: &'static str,
}

/// A legacy formatting code with its chat component flag name.
#[derive(Debug, Clone, Copy)]
pub struct FormatCode {
    pub code: char,
    pub name: &'static str,
}

pub const COLOR_CODES: [ColorCode; 16] = [
    ColorCode { code: '0', name: "black", hex: "#000000" },
    ColorCode { code: '1', name: "dark_blue", hex: "#0000AA" },
    ColorCode { code: '2', name: "dark_green", hex: "#00AA00" },
    ColorCode { code: '3', name: "dark_aqua", hex: "#00AAAA" },
    ColorCode { code: '4', name: "dark_red", hex: "#AA0000" },
    ColorCode { code: '5', name: "dark_purple", hex: "#AA00AA" },
    ColorCode { code: '6', name: "gold", hex: "#FFAA00" },
    ColorCode { code: '7', name: "gray", hex: "#AAAAAA" },
    ColorCode { code: '8', name: "dark_gray", hex: "#555555" },
    ColorCode { code: '9', name: "blue", hex: "#5555FF" },
    ColorCode { code: 'a', name: "green", hex: "#55FF55" },
    ColorCode { code: 'b', name: "aqua", hex: "#55FFFF" },
    ColorCode { code: 'c', name: "red", hex: "#FF5555" },
    ColorCode { code: 'd', name: "light_purple", hex: "#FF55FF" },
    ColorCode { code: 'e', name: "yellow", hex: "#FFFF55" },
    ColorCode { code: 'f', name: "white", hex: "#FFFFFF" },
];

pub const FORMAT_CODES: [FormatCode; 6] = [
    FormatCode { code: 'k', name: "obfuscated" },
    FormatCode { code: 'l', name: "bold" },
    FormatCode { code: 'm', name: "strikethrough" },
    FormatCode { code: 'n', name: "underlined" },
    FormatCode { code: 'o', name: "italic" },
    FormatCode { code: 'r', name: "reset" },
];

/// Server MOTD in three renderings.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Motd {
    /// Legacy `§` formatted text.
    pub raw: String,
    /// Text with every formatting code removed.
    pub clean: String,
    /// HTML with `<span>` styling.
    pub html: String,
}

/// Converts chat descriptions into [Motd] using its own code tables.
#[derive(Debug, Clone, Copy)]
pub struct MotdFormatter {
    colors: &'static [ColorCode],
    formats: &'static [FormatCode],
}

impl Default for MotdFormatter {
    fn default() -> Self {
        Self::new(&COLOR_CODES, &FORMAT_CODES)
    }
}

#[derive(Default, Clone, Copy)]
struct Style {
    color: Option<&'static str>,
    obfuscated: bool,
    bold: bool,
    strikethrough: bool,
    underlined: bool,
    italic: bool,
}

impl Style {
    fn is_plain(&self) -> bool {
        self.color.is_none()
            && !self.obfuscated
            && !self.bold
            && !self.strikethrough
            && !self.underlined
            && !self.italic
    }

    fn css(&self) -> String {
        let mut rules = Vec::new();

        if let Some(color) = self.color {
            rules.push(format!("color: {};", color));
        }
        if self.bold {
            rules.push("font-weight: bold;".into());
        }
        if self.italic {
            rules.push("font-style: italic;".into());
        }
        match (self.underlined, self.strikethrough) {
            (true, true) => rules.push("text-decoration: underline line-through;".into()),
            (true, false) => rules.push("text-decoration: underline;".into()),
            (false, true) => rules.push("text-decoration: line-through;".into()),
            _ => {}
        }

        rules.join(" ")
    }
}

impl MotdFormatter {
    pub const fn new(colors: &'static [ColorCode], formats: &'static [FormatCode]) -> Self {
        Self { colors, formats }
    }

    /// Format a description that is either a plain string or a chat component.
    pub fn format(&self, description: &Value) -> Motd {
        self.format_legacy(&self.to_legacy(description))
    }

    /// Format text that already carries `§` codes.
    pub fn format_legacy(&self, raw: &str) -> Motd {
        Motd {
            raw: raw.to_string(),
            clean: self.clean(raw),
            html: self.to_html(raw),
        }
    }

    /// Flatten a chat component into legacy `§` formatted text.
    ///
    /// Children inherit their parent's style, siblings do not inherit from each other.
    pub fn to_legacy(&self, component: &Value) -> String {
        let mut writer = LegacyWriter::default();

        self.write_component(component, &ComponentStyle::default(), &mut writer);

        writer.out
    }

    fn write_component(
        &self,
        component: &Value,
        parent: &ComponentStyle,
        writer: &mut LegacyWriter,
    ) {
        match component {
            Value::String(text) => writer.push(parent, text),
            Value::Number(num) => writer.push(parent, &num.to_string()),
            Value::Bool(b) => writer.push(parent, &b.to_string()),
            Value::Null => {}
            Value::Array(parts) => {
                for part in parts {
                    self.write_component(part, parent, writer);
                }
            }
            Value::Object(map) => {
                let style = self.component_style(map, parent);

                match map.get("text") {
                    Some(Value::String(text)) => writer.push(&style, text),
                    Some(Value::Number(num)) => writer.push(&style, &num.to_string()),
                    _ => {
                        if let Some(key) = map.get("translate").and_then(Value::as_str) {
                            writer.push(&style, key);
                        }
                    }
                }

                if let Some(Value::Array(extra)) = map.get("extra") {
                    for part in extra {
                        self.write_component(part, &style, writer);
                    }
                }
            }
        }
    }

    fn component_style(
        &self,
        map: &Map<String, Value>,
        parent: &ComponentStyle,
    ) -> ComponentStyle {
        let color_name = map.get("color").and_then(Value::as_str);
        let unstyled = ComponentStyle::default();

        // `reset` drops everything the parent set.
        let parent = match color_name {
            Some("reset") => &unstyled,
            _ => parent,
        };
        let color = color_name
            .and_then(|name| self.colors.iter().find(|c| c.name == name))
            .map(|c| c.code)
            .or(parent.color);
        let formats = self
            .formats
            .iter()
            .filter(|f| f.code != RESET_CODE)
            .filter(|f| match map.get(f.name) {
                Some(value) => is_enabled(value),
                None => parent.formats.contains(&f.code),
            })
            .map(|f| f.code)
            .collect();

        ComponentStyle { color, formats }
    }

    /// Strip every `§x` code.
    pub fn clean(&self, raw: &str) -> String {
        let mut result = String::with_capacity(raw.len());
        let mut chars = raw.chars();

        while let Some(c) = chars.next() {
            match c {
                SECTION_SIGN => {
                    chars.next();
                }
                c => result.push(c),
            }
        }

        result
    }

    pub fn to_html(&self, raw: &str) -> String {
        let mut html = String::new();
        let mut style = Style::default();
        let mut text = String::new();
        let mut chars = raw.chars();

        while let Some(c) = chars.next() {
            if c != SECTION_SIGN {
                text.push(c);
                continue;
            }

            let Some(code) = chars.next().map(|c| c.to_ascii_lowercase()) else {
                break;
            };

            push_span(&mut html, &style, &text);
            text.clear();

            if let Some(color) = self.colors.iter().find(|color| color.code == code) {
                // A colour code resets every format, like the client does.
                style = Style {
                    color: Some(color.hex),
                    ..Default::default()
                };
                continue;
            }

            match self.formats.iter().find(|format| format.code == code) {
                Some(format) => match format.name {
                    "obfuscated" => style.obfuscated = true,
                    "bold" => style.bold = true,
                    "strikethrough" => style.strikethrough = true,
                    "underlined" => style.underlined = true,
                    "italic" => style.italic = true,
                    _ => style = Style::default(),
                },
                None => {}
            }
        }

        push_span(&mut html, &style, &text);

        html
    }
}

fn push_span(html: &mut String, style: &Style, text: &str) {
    if text.is_empty() {
        return;
    }

    let escaped = escape_html(text);

    match style.is_plain() {
        true => html.push_str(&format!("<span>{}</span>", escaped)),
        false => html.push_str(&format!(
            "<span style=\"{}\">{}</span>",
            style.css(),
            escaped
        )),
    }
}

fn escape_html(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for c in text.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#39;"),
            '\n' => result.push_str("<br/>"),
            c => result.push(c),
        }
    }

    result
}

/// Style a chat component resolves to after inheritance.
#[derive(Default, Clone, PartialEq, Eq)]
struct ComponentStyle {
    color: Option<char>,
    formats: Vec<char>,
}

impl ComponentStyle {
    fn codes(&self) -> String {
        self.color
            .iter()
            .chain(self.formats.iter())
            .flat_map(|&code| [SECTION_SIGN, code])
            .collect()
    }
}

/// Legacy text being built, with the style its codes currently leave active.
#[derive(Default)]
struct LegacyWriter {
    out: String,
    active: ComponentStyle,
}

impl LegacyWriter {
    fn push(&mut self, style: &ComponentStyle, text: &str) {
        if text.is_empty() {
            return;
        }

        if *style != self.active {
            // A colour code clears formats by itself, anything else needs a reset first.
            if style.color.is_none() && self.active != ComponentStyle::default() {
                self.out.push(SECTION_SIGN);
                self.out.push(RESET_CODE);
            }

            self.out.push_str(&style.codes());
            self.active = style.clone();
        }

        self.out.push_str(text);
    }
}

/// Flags show up both as booleans and as `"true"` strings.
fn is_enabled(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s == "true",
        _ => false,
    }
}

/// Format a chat description with the default code tables.
pub fn format_chat_markup(description: &Value) -> Motd {
    MotdFormatter::default().format(description)
}

/// Format legacy `§` text with the default code tables.
pub fn format_legacy_markup(raw: &str) -> Motd {
    MotdFormatter::default().format_legacy(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_string() {
        let motd = format_chat_markup(&json!("A Server"));

        assert_eq!(motd.raw, "A Server");
        assert_eq!(motd.clean, "A Server");
        assert_eq!(motd.html, "<span>A Server</span>");
    }

    #[test]
    fn component_becomes_legacy_codes() {
        let description = json!({
            "text": "",
            "extra": [
                { "text": "Hello ", "color": "gold", "bold": true },
                { "text": "world", "color": "aqua", "italic": "true" }
            ]
        });
        let motd = format_chat_markup(&description);

        assert_eq!(motd.raw, "§6§lHello §b§oworld");
        assert_eq!(motd.clean, "Hello world");
        assert_eq!(
            motd.html,
            "<span style=\"color: #FFAA00; font-weight: bold;\">Hello </span>\
             <span style=\"color: #55FFFF; font-style: italic;\">world</span>"
        );
    }

    #[test]
    fn siblings_do_not_share_style() {
        let motd = format_chat_markup(&json!({
            "extra": [{ "text": "A", "color": "red" }, { "text": "B" }]
        }));

        assert_eq!(motd.raw, "§cA§rB");
        assert_eq!(
            motd.html,
            "<span style=\"color: #FF5555;\">A</span><span>B</span>"
        );
    }

    #[test]
    fn children_inherit_parent_style() {
        let motd = format_chat_markup(&json!({
            "text": "Hi ",
            "color": "gold",
            "extra": [
                { "text": "there", "bold": true },
                { "text": "!" },
                { "text": " plain", "color": "reset" }
            ]
        }));

        assert_eq!(motd.raw, "§6Hi §6§lthere§6!§r plain");
        assert_eq!(motd.clean, "Hi there! plain");
    }

    #[test]
    fn reset_and_escaping() {
        let motd = format_legacy_markup("§cred§r <b>\nnext");

        assert_eq!(motd.clean, "red <b>\nnext");
        assert_eq!(
            motd.html,
            "<span style=\"color: #FF5555;\">red</span><span> &lt;b&gt;<br/>next</span>"
        );
    }

    #[test]
    fn dangling_section_sign() {
        assert_eq!(format_legacy_markup("abc§").clean, "abc");
    }
}
