//! console output of glsl source: ansi syntax highlighting and numbered listings
use std::fmt::Write;
use Highlight::*;

use crate::glsl_words::{BUILTIN_FUNCTIONS, BUILTIN_TYPES, KEYWORDS};

macro_rules! highlights {
    ($($kind: ident => $color: expr,)+) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum Highlight {$($kind),+}
        const HIGHLIGHTS: &[Highlight] = &[$(Highlight::$kind),+];
        impl Highlight {
            pub fn get_color(&self) -> &'static str {
                match self {$($kind => $color),+}
            }
        }
    };
}

highlights! {
    //this is the order in which they will be attempted to parse
    //colors are converted to 256 ansi colors
    //first match counts
    Comment         => "#4B795D",
    LineComment     => "#4B795D",
    Preprocessor    => "#A26C79",
    Placeholder     => "#D7A35B",
    BuiltinType     => "#30948A",
    BuiltinFunc     => "#9A639C",
    GLUnderscore    => "#9A639C",
    Keyword         => "#719DD1",
    UppercaseIdent  => "#17988B",
    Ident           => "#6F6F6F",
    Operator        => "#949494",
    Punctuation     => "#777777",
    Braces          => "#553856",
    Number          => "#778571",
    Unmatched       => "#DA929C",
}

fn try_read_str<'a>(input: &'a str, patterns: &[&str]) -> Option<(&'a str, &'a str)> {
    patterns
        .iter()
        .filter(|t| input.starts_with(**t))
        .max_by_key(|t| t.len())
        .map(|t| input.split_at(t.len()))
}

fn try_read_word<'a>(input: &'a str, patterns: &[&str]) -> Option<(&'a str, &'a str)> {
    let len = word_len(input);
    (len > 0 && patterns.contains(&&input[..len])).then(|| input.split_at(len))
}

fn try_read_from_until<'a>(input: &'a str, [a, b]: [&str; 2]) -> Option<(&'a str, &'a str)> {
    try_read_str(input, &[a]).map(|(_head, tail)| {
        tail.find(b)
            .map(|len| input.split_at(a.len() + len + b.len()))
            .unwrap_or((input, ""))
    })
}

fn word_len(input: &str) -> usize {
    input
        .chars()
        .take_while(|x| x.is_alphanumeric() || *x == '_')
        .map(|x| x.len_utf8())
        .sum()
}

fn try_read_ident(input: &str, starts: impl Fn(char) -> bool) -> Option<(&str, &str)> {
    input.starts_with(starts).then(|| input.split_at(word_len(input)))
}

/// splits glsl code into highlighted tokens, concatenating the tokens
/// yields the input again
pub fn tokenize(mut code: &str) -> Vec<(Highlight, &str)> {
    let mut tokens = vec![];
    loop {
        let found = HIGHLIGHTS.iter().find_map(|h| {
            match *h {
                Comment => try_read_from_until(code, ["/*", "*/"]),
                LineComment => try_read_from_until(code, ["//", "\n"]),
                Preprocessor => try_read_from_until(code, ["#", "\n"]),
                Placeholder => code.strip_prefix('$')
                    .filter(|tail| tail.starts_with(|x: char| x.is_alphabetic() || x == '_'))
                    .map(|tail| code.split_at(1 + word_len(tail))),
                Keyword => try_read_word(code, KEYWORDS),
                BuiltinType => try_read_word(code, BUILTIN_TYPES),
                BuiltinFunc => try_read_word(code, BUILTIN_FUNCTIONS),
                GLUnderscore => code.starts_with("gl_").then(|| code.split_at(word_len(code))),
                UppercaseIdent => try_read_ident(code, |x| x.is_uppercase()),
                Ident => try_read_ident(code, |x| x.is_alphabetic() || x == '_'),
                Punctuation => try_read_str(code, &[".", "(", ")", ",", ";", "[", "]"]),
                Braces => try_read_str(code, &["{", "}"]),
                Number => code.starts_with(|x: char| x.is_ascii_digit()).then(|| {
                    let len = code
                        .chars()
                        .take_while(|x| x.is_ascii_digit() || ['.', 'u', 'U', 'e', 'f'].contains(x))
                        .map(|x| x.len_utf8())
                        .sum();
                    code.split_at(len)
                }),
                Operator => try_read_str(
                    code,
                    &[
                        "=", "+", "-", "~", "!", "*", "/", "%", "<<", ">>", "<", ">", "<=", ">=", "==", "!=", "&", "^",
                        "|", "&&", "||", "?", ":",
                    ],
                ),
                Unmatched => code.chars().next().map(|c| code.split_at(c.len_utf8())), //advance by 1 char
            }
            .map(|split| (split, *h))
        });

        match found {
            None => break,
            Some(((token, tail), h)) => {
                code = tail;
                tokens.push((h, token));
            }
        }
    }
    tokens
}

/// add color codes to the glsl string to highlight glsl syntax
pub fn syntax_highlight_glsl(code: &str) -> String {
    let mut out = "".to_string();
    for (h, token) in tokenize(code) {
        // whitespace is matched as `Unmatched`, leave it uncolored
        match token.trim().is_empty() {
            true => out.push_str(token),
            false => {
                set_color(&mut out, Some(h.get_color()), true);
                out.push_str(token);
            }
        }
    }
    set_color(&mut out, None, false);
    out
}

/// prefixes every line with its 1-based line number
pub fn numbered_listing(code: &str) -> String {
    let width = code.lines().count().max(1).to_string().len();
    let mut out = String::new();
    for (i, line) in code.lines().enumerate() {
        writeln!(out, "{:>width$} | {line}", i + 1).ok();
    }
    out
}

/// [`numbered_listing`] with syntax highlighted lines
pub fn numbered_listing_colored(code: &str) -> String {
    let width = code.lines().count().max(1).to_string().len();
    let mut out = String::new();
    for (i, line) in code.lines().enumerate() {
        set_color(&mut out, Some(Punctuation.get_color()), true);
        write!(out, "{:>width$} | ", i + 1).ok();
        writeln!(out, "{}", syntax_highlight_glsl(line)).ok();
    }
    out
}

/// takes #RRGGBB hex codes, e.g. "#FE2215"
fn hex_to_rgb8(hexcode: &str) -> Option<[u8; 3]> {
    let hex = hexcode.strip_prefix('#').filter(|hex| hex.len() == 6)?;
    match [
        u8::from_str_radix(hex.get(0..2)?, 16),
        u8::from_str_radix(hex.get(2..4)?, 16),
        u8::from_str_radix(hex.get(4..6)?, 16),
    ] {
        [Ok(r), Ok(g), Ok(b)] => Some([r, g, b]),
        _ => None,
    }
}

pub fn set_color<W: std::fmt::Write>(w: &mut W, hexcode: Option<&str>, use_256_color_mode: bool) {
    match hexcode.map(hex_to_rgb8) {
        None => w.write_str("\x1B[0m").ok(),
        Some(None) => None,
        Some(Some(rgb)) => {
            if use_256_color_mode {
                let [r, g, b] = rgb.map(|n8| (n8 as f32 / (256.0 / 6.0)) as u8);
                w.write_fmt(format_args!("\x1B[38;5;{}m", 16 + b + (6 * (g + 6 * r))))
                    .ok()
            } else {
                let [r, g, b] = rgb;
                w.write_fmt(format_args!("\x1B[38;2;{};{};{}m", r, g, b)).ok()
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tokens_cover_the_input() {
        let code = "uniform vec4 u_color; // tint\nvoid main() { gl_FragColor = $color * 2.0; }";
        let tokens = tokenize(code);
        assert_eq!(tokens.iter().map(|(_, t)| *t).collect::<String>(), code);
        assert!(tokens.contains(&(Keyword, "uniform")));
        assert!(tokens.contains(&(BuiltinType, "vec4")));
        assert!(tokens.contains(&(LineComment, "// tint\n")));
        assert!(tokens.contains(&(GLUnderscore, "gl_FragColor")));
        assert!(tokens.contains(&(Placeholder, "$color")));
        assert!(tokens.contains(&(Number, "2.0")));
        assert!(tokens.contains(&(Operator, "*")));
    }

    #[test]
    fn words_are_matched_whole() {
        let tokens = tokenize("int interval");
        assert_eq!(tokens, [(BuiltinType, "int"), (Unmatched, " "), (Ident, "interval")]);
    }

    #[test]
    fn listing() {
        assert_eq!(numbered_listing("a\nb"), "1 | a\n2 | b\n");
        let listing = numbered_listing(&"x\n".repeat(10));
        assert!(listing.starts_with(" 1 | x\n"));
        assert!(listing.ends_with("10 | x\n"));
    }

    #[test]
    fn highlighting_keeps_text() {
        let colored = syntax_highlight_glsl("float x;");
        assert!(colored.contains("float"));
        assert!(colored.contains("\x1B[38;5;"));
        assert!(colored.ends_with("\x1B[0m"));
    }

    #[test]
    fn invalid_colors_are_skipped() {
        assert_eq!(hex_to_rgb8("#FE2215"), Some([0xFE, 0x22, 0x15]));
        assert_eq!(hex_to_rgb8("FE2215"), None);
        let mut out = String::new();
        set_color(&mut out, Some("#zz"), true);
        assert!(out.is_empty());
    }
}
