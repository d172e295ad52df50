//! Printf-style numeric reformatting for `$INT()` and `$REAL()`.
//!
//! A format string is literal text around exactly one `%` conversion. The
//! conversion must match the numeric kind: `d i u x X o` for integers,
//! `f F e E g G` for reals; flags `- 0 + space`, width and precision are
//! honored.

use crate::error::{EvalError, EvalResult};

struct Spec<'a> {
    prefix: &'a str,
    suffix: &'a str,
    minus: bool,
    zero: bool,
    plus: bool,
    space: bool,
    width: usize,
    precision: Option<usize>,
    conv: char,
}

fn parse_spec<'a>(fmt: &'a str, kind: &'static str) -> EvalResult<Spec<'a>> {
    let bad = || EvalError::BadFormat {
        kind,
        fmt: fmt.to_string(),
    };
    let pct = fmt.find('%').ok_or_else(bad)?;
    let prefix = &fmt[..pct];
    let bytes = fmt.as_bytes();
    let mut i = pct + 1;

    let (mut minus, mut zero, mut plus, mut space) = (false, false, false, false);
    while let Some(&c) = bytes.get(i) {
        match c {
            b'-' => minus = true,
            b'0' => zero = true,
            b'+' => plus = true,
            b' ' => space = true,
            _ => break,
        }
        i += 1;
    }

    let mut width = 0usize;
    while let Some(c) = bytes.get(i).filter(|c| c.is_ascii_digit()) {
        width = width * 10 + (c - b'0') as usize;
        i += 1;
    }

    let mut precision = None;
    if bytes.get(i) == Some(&b'.') {
        i += 1;
        let mut p = 0usize;
        while let Some(c) = bytes.get(i).filter(|c| c.is_ascii_digit()) {
            p = p * 10 + (c - b'0') as usize;
            i += 1;
        }
        precision = Some(p);
    }

    let conv = *bytes.get(i).ok_or_else(bad)? as char;
    i += 1;
    let suffix = &fmt[i..];
    if suffix.contains('%') {
        return Err(bad());
    }

    Ok(Spec {
        prefix,
        suffix,
        minus,
        zero,
        plus,
        space,
        width,
        precision,
        conv,
    })
}

fn render(spec: &Spec, sign: &str, body: &str) -> String {
    let len = sign.len() + body.len();
    let mut out = String::with_capacity(spec.prefix.len() + len.max(spec.width) + spec.suffix.len());
    out.push_str(spec.prefix);
    if len >= spec.width {
        out.push_str(sign);
        out.push_str(body);
    } else if spec.minus {
        out.push_str(sign);
        out.push_str(body);
        out.push_str(&" ".repeat(spec.width - len));
    } else if spec.zero {
        out.push_str(sign);
        out.push_str(&"0".repeat(spec.width - len));
        out.push_str(body);
    } else {
        out.push_str(&" ".repeat(spec.width - len));
        out.push_str(sign);
        out.push_str(body);
    }
    out.push_str(spec.suffix);
    out
}

pub(crate) fn format_int(fmt: &str, value: i64) -> EvalResult<String> {
    let spec = parse_spec(fmt, "integer")?;
    let (sign, digits) = match spec.conv {
        'd' | 'i' => {
            let sign = if value < 0 {
                "-"
            } else if spec.plus {
                "+"
            } else if spec.space {
                " "
            } else {
                ""
            };
            let mut digits = value.unsigned_abs().to_string();
            if let Some(p) = spec.precision {
                while digits.len() < p {
                    digits.insert(0, '0');
                }
            }
            (sign, digits)
        }
        'u' => ("", (value as u64).to_string()),
        'x' => ("", format!("{:x}", value as u64)),
        'X' => ("", format!("{:X}", value as u64)),
        'o' => ("", format!("{:o}", value as u64)),
        _ => {
            return Err(EvalError::BadFormat {
                kind: "integer",
                fmt: fmt.to_string(),
            });
        }
    };
    Ok(render(&spec, sign, &digits))
}

pub(crate) fn format_real(fmt: &str, value: f64) -> EvalResult<String> {
    let spec = parse_spec(fmt, "real")?;
    let sign = if value.is_sign_negative() && value != 0.0 {
        "-"
    } else if spec.plus {
        "+"
    } else if spec.space {
        " "
    } else {
        ""
    };
    let magnitude = value.abs();
    let body = match spec.conv {
        'f' | 'F' => format!("{:.*}", spec.precision.unwrap_or(6), magnitude),
        'e' | 'E' => sci_format(magnitude, spec.precision.unwrap_or(6), spec.conv == 'E'),
        'g' | 'G' => general_format(magnitude, spec.precision.unwrap_or(6), spec.conv == 'G'),
        _ => {
            return Err(EvalError::BadFormat {
                kind: "real",
                fmt: fmt.to_string(),
            });
        }
    };
    Ok(render(&spec, sign, &body))
}

/// `%e`: mantissa with fixed precision and a signed two-digit exponent.
fn sci_format(v: f64, precision: usize, upper: bool) -> String {
    let raw = format!("{:.*e}", precision, v);
    let Some((mantissa, exp)) = raw.split_once('e') else {
        return raw;
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    let e = if upper { 'E' } else { 'e' };
    let exp_sign = if exp < 0 { '-' } else { '+' };
    format!("{mantissa}{e}{exp_sign}{:02}", exp.unsigned_abs())
}

/// `%g`: `precision` significant digits, fixed or scientific notation by
/// exponent, trailing zeros stripped.
fn general_format(v: f64, precision: usize, upper: bool) -> String {
    let p = precision.max(1);
    if v == 0.0 {
        return "0".to_string();
    }
    let sci = format!("{:.*e}", p - 1, v);
    let Some((_, exp)) = sci.split_once('e') else {
        return sci;
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    if exp >= -4 && (exp as i64) < p as i64 {
        let decimals = (p as i32 - 1 - exp).max(0) as usize;
        strip_zeros(format!("{:.*}", decimals, v))
    } else {
        let short = strip_zeros(sci[..sci.find('e').unwrap_or(sci.len())].to_string());
        let e = if upper { 'E' } else { 'e' };
        let exp_sign = if exp < 0 { '-' } else { '+' };
        format!("{short}{e}{exp_sign}{:02}", exp.unsigned_abs())
    }
}

fn strip_zeros(s: String) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_formats() {
        assert_eq!(format_int("%d", 5).unwrap(), "5");
        assert_eq!(format_int("%03d", 5).unwrap(), "005");
        assert_eq!(format_int("  %d", 5).unwrap(), "  5");
        assert_eq!(format_int("_%04u_", 5).unwrap(), "_0005_");
        assert_eq!(format_int("%02d", 8).unwrap(), "08");
        assert_eq!(format_int("%05d", -12).unwrap(), "-0012");
        assert_eq!(format_int("%-4d|", 7).unwrap(), "7   |");
        assert_eq!(format_int("%+d", 7).unwrap(), "+7");
        assert_eq!(format_int("%x", 255).unwrap(), "ff");
        assert_eq!(format_int("%X", 255).unwrap(), "FF");
        assert_eq!(format_int("%o", 8).unwrap(), "10");
    }

    #[test]
    fn test_int_format_rejects_wrong_kind() {
        assert!(format_int("%f", 5).is_err());
        assert!(format_int("no conversion", 5).is_err());
        assert!(format_int("%d%d", 5).is_err());
    }

    #[test]
    fn test_real_fixed_formats() {
        assert_eq!(format_real("%.1f", 4.56).unwrap(), "4.6");
        assert_eq!(format_real(" _%.3f_", 11.0 / 3.0).unwrap(), " _3.667_");
        assert_eq!(format_real("%2f", 1.0).unwrap(), "1.000000");
        assert_eq!(format_real("%06.3f", 2.0).unwrap(), "02.000");
        assert_eq!(format_real("%.2f", 2.0).unwrap(), "2.00");
        assert_eq!(format_real("%.1f", -4.56).unwrap(), "-4.6");
    }

    #[test]
    fn test_real_scientific_and_general() {
        assert_eq!(format_real("%e", 0.3).unwrap(), "3.000000e-01");
        assert_eq!(format_real("%.2e", 12345.0).unwrap(), "1.23e+04");
        assert_eq!(format_real("%g", 0.3).unwrap(), "0.3");
        assert_eq!(format_real("%g", 5.0).unwrap(), "5");
        assert_eq!(format_real("%g", 1234567.0).unwrap(), "1.23457e+06");
    }

    #[test]
    fn test_real_format_rejects_wrong_kind() {
        assert!(format_real("%d", 0.3).is_err());
        assert!(format_real("%s", 0.3).is_err());
    }
}
