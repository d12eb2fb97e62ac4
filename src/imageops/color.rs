use std::fmt;
use std::str::FromStr;

use image::Rgba;

use crate::errors::EraserError;

pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Backdrop painted beneath a processed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Background {
    #[default]
    Transparent,
    Color(Rgba<u8>),
}

const NAMED_COLORS: &[(&str, [u8; 3])] = &[
    ("white", [255, 255, 255]),
    ("black", [0, 0, 0]),
    ("red", [255, 0, 0]),
    ("green", [0, 128, 0]),
    ("lime", [0, 255, 0]),
    ("blue", [0, 0, 255]),
    ("yellow", [255, 255, 0]),
    ("cyan", [0, 255, 255]),
    ("aqua", [0, 255, 255]),
    ("magenta", [255, 0, 255]),
    ("fuchsia", [255, 0, 255]),
    ("gray", [128, 128, 128]),
    ("grey", [128, 128, 128]),
    ("silver", [192, 192, 192]),
    ("maroon", [128, 0, 0]),
    ("olive", [128, 128, 0]),
    ("navy", [0, 0, 128]),
    ("purple", [128, 0, 128]),
    ("teal", [0, 128, 128]),
    ("orange", [255, 165, 0]),
    ("pink", [255, 192, 203]),
    ("hotpink", [255, 105, 180]),
    ("lavender", [230, 230, 250]),
    ("lightblue", [173, 216, 230]),
    ("skyblue", [135, 206, 235]),
    ("lightgreen", [144, 238, 144]),
    ("lightgray", [211, 211, 211]),
    ("lightgrey", [211, 211, 211]),
    ("darkgray", [169, 169, 169]),
    ("darkgrey", [169, 169, 169]),
    ("beige", [245, 245, 220]),
    ("ivory", [255, 255, 240]),
    ("mintcream", [245, 255, 250]),
    ("honeydew", [240, 255, 240]),
    ("aliceblue", [240, 248, 255]),
    ("mistyrose", [255, 228, 225]),
    ("peachpuff", [255, 218, 185]),
    ("lemonchiffon", [255, 250, 205]),
    ("thistle", [216, 191, 216]),
    ("coral", [255, 127, 80]),
    ("salmon", [250, 128, 114]),
    ("gold", [255, 215, 0]),
    ("khaki", [240, 230, 140]),
    ("tan", [210, 180, 140]),
    ("brown", [165, 42, 42]),
    ("indigo", [75, 0, 130]),
    ("violet", [238, 130, 238]),
    ("turquoise", [64, 224, 208]),
    ("whitesmoke", [245, 245, 245]),
];

fn invalid(raw: &str) -> EraserError {
    EraserError::validation("background", format!("`{raw}` is not a recognized color"))
}

fn parse_hex(hex: &str) -> Option<Rgba<u8>> {
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    let nibble = |i: usize| u8::from_str_radix(&hex[i..=i], 16).ok().map(|v| v * 17);
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();

    match hex.len() {
        3 => Some(Rgba([nibble(0)?, nibble(1)?, nibble(2)?, 255])),
        4 => Some(Rgba([nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?])),
        6 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, 255])),
        8 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
        _ => None,
    }
}

fn parse_channel(token: &str) -> Option<u8> {
    let value = match token.strip_suffix('%') {
        Some(percent) => percent.parse::<f32>().ok()? / 100.0 * 255.0,
        None => token.parse::<f32>().ok()?,
    };
    (0.0..=255.0)
        .contains(&value)
        .then(|| value.round() as u8)
}

fn parse_alpha(token: &str) -> Option<u8> {
    let value = match token.strip_suffix('%') {
        Some(percent) => percent.parse::<f32>().ok()? / 100.0,
        None => token.parse::<f32>().ok()?,
    };
    (0.0..=1.0)
        .contains(&value)
        .then(|| (value * 255.0).round() as u8)
}

/// `rgb(1, 2, 3)`, `rgba(1, 2, 3, 0.5)` and the space separated `rgb(1 2 3 / 50%)` forms.
fn parse_rgb_function(input: &str) -> Option<Rgba<u8>> {
    let body = input
        .strip_prefix("rgba(")
        .or_else(|| input.strip_prefix("rgb("))?
        .strip_suffix(')')?;

    let (channels, alpha) = match body.split_once('/') {
        Some((channels, alpha)) => (channels, Some(alpha.trim())),
        None => (body, None),
    };
    let mut tokens: Vec<&str> = channels
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect();

    let alpha = match (alpha, tokens.len()) {
        (Some(alpha), 3) => parse_alpha(alpha)?,
        (None, 4) => parse_alpha(tokens.pop()?)?,
        (None, 3) => 255,
        _ => return None,
    };

    Some(Rgba([
        parse_channel(tokens[0])?,
        parse_channel(tokens[1])?,
        parse_channel(tokens[2])?,
        alpha,
    ]))
}

impl FromStr for Background {
    type Err = EraserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(EraserError::validation("background", "is empty"));
        }

        let lowered = raw.to_ascii_lowercase();
        if lowered == "transparent" {
            return Ok(Background::Transparent);
        }

        let color = if let Some(hex) = lowered.strip_prefix('#') {
            parse_hex(hex)
        } else if lowered.starts_with("rgb") {
            parse_rgb_function(&lowered)
        } else {
            NAMED_COLORS
                .iter()
                .find(|(name, _)| *name == lowered)
                .map(|(_, [r, g, b])| Rgba([*r, *g, *b, 255]))
        };

        color.map(Background::Color).ok_or_else(|| invalid(raw))
    }
}

impl fmt::Display for Background {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Background::Transparent => f.write_str("transparent"),
            Background::Color(Rgba([r, g, b, 255])) => write!(f, "#{r:02x}{g:02x}{b:02x}"),
            Background::Color(Rgba([r, g, b, a])) => write!(f, "#{r:02x}{g:02x}{b:02x}{a:02x}"),
        }
    }
}
