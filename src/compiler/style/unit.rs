use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::config::UnitConfig;

use super::parser::Sheet;

static RE_UNIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)url\([^)]*\)|([0-9.]+)(px|rem)").expect("valid regex"));

/// Converts `px` and `rem` lengths in a declaration value to `rpx`.
/// `url(...)` arguments are left untouched.
pub fn convert(value: &str, unit: UnitConfig) -> String {
    RE_UNIT
        .replace_all(value, |caps: &Captures| {
            let whole = &caps[0];
            let (Some(number), Some(suffix)) = (caps.get(1), caps.get(2)) else {
                return whole.to_string();
            };

            match suffix.as_str().to_ascii_lowercase().as_str() {
                "px" if unit.px2rpx => format!("{}rpx", number.as_str()),
                "rem" if unit.rem2rpx => match number.as_str().parse::<f64>() {
                    Ok(n) => format!("{}rpx", ((n * 100.0) * 1000.0).round() / 1000.0),
                    Err(_) => whole.to_string(),
                },
                _ => whole.to_string(),
            }
        })
        .into_owned()
}

pub fn convert_sheet(sheet: &mut Sheet, unit: UnitConfig) {
    if unit.px2rpx || unit.rem2rpx {
        sheet.map_values(|value| convert(value, unit));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: UnitConfig = UnitConfig {
        px2rpx: true,
        rem2rpx: true,
    };

    #[test]
    fn test_convert() {
        assert_eq!(convert("10px", ALL), "10rpx");
        assert_eq!(convert("1rem 1.5REM .125rem", ALL), "100rpx 150rpx 12.5rpx");
        assert_eq!(convert("1px solid #000", ALL), "1rpx solid #000");
        assert_eq!(convert("10em 50% 2vh 3rpx", ALL), "10em 50% 2vh 3rpx");
        assert_eq!(convert("url(./a-10px.png) 2px", ALL), "url(./a-10px.png) 2rpx");
    }

    #[test]
    fn test_switches() {
        let px_only = UnitConfig {
            px2rpx: true,
            rem2rpx: false,
        };
        assert_eq!(convert("1px 1rem", px_only), "1rpx 1rem");

        let rem_only = UnitConfig {
            px2rpx: false,
            rem2rpx: true,
        };
        assert_eq!(convert("1px 1rem", rem_only), "1px 100rpx");
    }

    #[test]
    fn test_convert_sheet_skips_selectors() {
        let mut sheet = Sheet::parse(".w-10px { width: 10px; }").unwrap();
        convert_sheet(&mut sheet, ALL);
        assert_eq!(sheet.to_css(), ".w-10px {\n  width: 10rpx;\n}\n");
    }
}
