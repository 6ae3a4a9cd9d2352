//! Numeric grammars: plain numbers, lengths, CSS sizes, colors and custom patterns.
//!
//! Every grammar is anchored at the start of the value. With
//! `garbage_trimming` (the default) the matched prefix is kept and anything
//! after it is dropped, so `10px;expression(...)` becomes `10px`; without it
//! the whole value has to match.
//!
//! License: MIT OR APACHE 2.0

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::borrow::Cow;

const DIGITS: &str = r"\d{1,7}";
const SIGN: &str = "[+-]?";

/// CSS units accepted by sizes. The empty unit is a bare number.
pub const SIZE_UNITS: [&str; 10] = ["px", "cm", "mm", "in", "pt", "pc", "em", "ex", "%", ""];

/// CSS2 system colors and the extended named colors.
pub const COLOR_NAMES: &[&str] = &[
    "activeborder", "activecaption", "appworkspace", "background", "buttonface",
    "buttonhighlight", "buttonshadow", "buttontext", "captiontext", "graytext", "highlight",
    "highlighttext", "inactiveborder", "inactivecaption", "inactivecaptiontext",
    "infobackground", "infotext", "menu", "menutext", "scrollbar", "threeddarkshadow",
    "threedface", "threedhighlight", "threedlightshadow", "threedshadow", "window",
    "windowframe", "windowtext", "currentcolor",
    "aliceblue", "antiquewhite", "aqua", "aquamarine", "azure", "beige", "bisque", "black",
    "blanchedalmond", "blue", "blueviolet", "brown", "burlywood", "cadetblue", "chartreuse",
    "chocolate", "coral", "cornflowerblue", "cornsilk", "crimson", "cyan", "darkblue",
    "darkcyan", "darkgoldenrod", "darkgray", "darkgreen", "darkgrey", "darkkhaki",
    "darkmagenta", "darkolivegreen", "darkorange", "darkorchid", "darkred", "darksalmon",
    "darkseagreen", "darkslateblue", "darkslategray", "darkslategrey", "darkturquoise",
    "darkviolet", "deeppink", "deepskyblue", "dimgray", "dimgrey", "dodgerblue", "firebrick",
    "floralwhite", "forestgreen", "fuchsia", "gainsboro", "ghostwhite", "gold", "goldenrod",
    "gray", "green", "greenyellow", "grey", "honeydew", "hotpink", "indianred", "indigo",
    "ivory", "khaki", "lavender", "lavenderblush", "lawngreen", "lemonchiffon", "lightblue",
    "lightcoral", "lightcyan", "lightgoldenrodyellow", "lightgray", "lightgreen", "lightgrey",
    "lightpink", "lightsalmon", "lightseagreen", "lightskyblue", "lightslategray",
    "lightslategrey", "lightsteelblue", "lightyellow", "lime", "limegreen", "linen", "magenta",
    "maroon", "mediumaquamarine", "mediumblue", "mediumorchid", "mediumpurple",
    "mediumseagreen", "mediumslateblue", "mediumspringgreen", "mediumturquoise",
    "mediumvioletred", "midnightblue", "mintcream", "mistyrose", "moccasin", "navajowhite",
    "navy", "oldlace", "olive", "olivedrab", "orange", "orangered", "orchid", "palegoldenrod",
    "palegreen", "paleturquoise", "palevioletred", "papayawhip", "peachpuff", "peru", "pink",
    "plum", "powderblue", "purple", "red", "rosybrown", "royalblue", "saddlebrown", "salmon",
    "sandybrown", "seagreen", "seashell", "sienna", "silver", "skyblue", "slateblue",
    "slategray", "slategrey", "snow", "springgreen", "steelblue", "tan", "teal", "thistle",
    "tomato", "turquoise", "violet", "wheat", "white", "whitesmoke", "yellow", "yellowgreen",
];

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// `#rgb`, `#rrggbb`, `rgb()/hsl()` with three channels, `rgba()/hsla()` with an alpha.
fn color_pattern() -> String {
    let channel = format!("{SIGN}{DIGITS}%?");
    format!(
        r"(?:rgb|hsl)\({c},{c},{c}\)|(?:rgba|hsla)\({c},{c},{c},(?:(?:{d})?\.{d}|{c})\)|#[0-9a-fA-F]{{6}}|#[0-9a-fA-F]{{3}}",
        c = channel,
        d = DIGITS
    )
}

/// The built-in numeric grammars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberShape {
    /// Up to seven digits, optionally signed.
    Number,
    /// Number with an optional `%`.
    Length,
    /// Number with an optional CSS unit.
    Size,
    /// Hex and functional color notations.
    Color,
}

/// Options shared by the numeric and pattern validators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberSettings {
    /// Accept a leading `+` or `-`.
    pub allow_sign: bool,
    /// Keep the matched prefix and drop the rest. When off, the whole value must match.
    pub garbage_trimming: bool,
    /// Remove all whitespace before matching.
    pub remove_spaces: bool,
    pub case_sensitive: bool,
}

impl Default for NumberSettings {
    fn default() -> Self {
        Self {
            allow_sign: true,
            garbage_trimming: true,
            remove_spaces: false,
            case_sensitive: false,
        }
    }
}

impl NumberSettings {
    /// Settings for sizes: whitespace is removed before matching.
    pub fn size() -> Self {
        Self { remove_spaces: true, ..Self::default() }
    }

    /// Settings for colors: unsigned, whitespace removed.
    pub fn color() -> Self {
        Self { allow_sign: false, remove_spaces: true, ..Self::default() }
    }
}

/// A compiled numeric or pattern grammar.
#[derive(Debug, Clone)]
pub struct NumberRule {
    regex: Regex,
    remove_spaces: bool,
}

impl NumberRule {
    /// Compiles the grammar for `shape`.
    ///
    /// # Arguments
    ///
    /// * `shape` - Which built-in grammar to use.
    /// * `settings` - Sign, trimming and whitespace options.
    pub fn new(shape: NumberShape, settings: NumberSettings) -> Result<Self, regex::Error> {
        let base = if settings.allow_sign {
            format!("{SIGN}{DIGITS}")
        } else {
            DIGITS.to_string()
        };
        let pattern = match shape {
            NumberShape::Number => base,
            NumberShape::Length => format!("{base}%?"),
            NumberShape::Size => format!("{base}(?:{})", SIZE_UNITS.join("|")),
            NumberShape::Color => color_pattern(),
        };
        Self::from_pattern(&pattern, settings)
    }

    /// Built-in grammars are assembled from constants and always compile.
    pub(crate) fn fixed(shape: NumberShape, settings: NumberSettings) -> Self {
        Self::new(shape, settings).expect("built-in numeric grammar must compile")
    }

    /// Anchors a caller-supplied pattern at the start (and at the end without garbage trimming).
    pub fn from_pattern(pattern: &str, settings: NumberSettings) -> Result<Self, regex::Error> {
        let mut anchored = format!("^(?:{pattern})");
        if !settings.garbage_trimming {
            anchored.push('$');
        }
        let regex = RegexBuilder::new(&anchored)
            .case_insensitive(!settings.case_sensitive)
            .build()?;
        Ok(Self { regex, remove_spaces: settings.remove_spaces })
    }

    /// The accepted prefix of `value`, if the grammar matches at all.
    pub fn matched(&self, value: &str) -> Option<String> {
        let candidate = if self.remove_spaces {
            WHITESPACE.replace_all(value, "")
        } else {
            Cow::Borrowed(value)
        };
        self.regex.find(&candidate).map(|m| m.as_str().to_string())
    }
}
