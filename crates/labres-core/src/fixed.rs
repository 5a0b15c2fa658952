//! Fixed-point decimal text helpers shared by `WorkHours`, `Money` and
//! `ExchangeRate`. Values are scaled integers; `scale` is the number of
//! fractional digits.

/// Power of ten for a fractional digit count.
pub(crate) const fn unit(scale: u32) -> i64 {
    10_i64.pow(scale)
}

/// Render a scaled integer as a decimal string with exactly `scale` digits.
pub(crate) fn format(value: i64, scale: u32) -> String {
    let unit = unit(scale);
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    let unit = unit.unsigned_abs();
    if scale == 0 {
        return format!("{}{}", sign, abs);
    }
    format!(
        "{}{}.{:0width$}",
        sign,
        abs / unit,
        abs % unit,
        width = scale as usize
    )
}

/// Parse a decimal string into a scaled integer.
///
/// Accepts an optional sign, an integer part and up to `scale` fractional
/// digits. Extra fractional digits are rounded half up.
pub(crate) fn parse(text: &str, scale: u32) -> Option<i64> {
    let text = text.trim();
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    if body.is_empty() {
        return None;
    }

    let (int_part, frac_part) = match body.split_once('.') {
        Some((i, f)) => (i, f),
        None => (body, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let int_value: i64 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().ok()?
    };

    let mut frac_value: i64 = 0;
    let mut digits = 0u32;
    let mut round_up = false;
    for (idx, c) in frac_part.chars().enumerate() {
        let d = i64::from(c.to_digit(10)?);
        if (idx as u32) < scale {
            frac_value = frac_value.checked_mul(10)?.checked_add(d)?;
            digits += 1;
        } else {
            if idx as u32 == scale {
                round_up = d >= 5;
            }
            break;
        }
    }
    while digits < scale {
        frac_value = frac_value.checked_mul(10)?;
        digits += 1;
    }

    let mut value = int_value
        .checked_mul(unit(scale))?
        .checked_add(frac_value)?;
    if round_up {
        value = value.checked_add(1)?;
    }
    Some(if negative { -value } else { value })
}

/// Integer division rounding half away from zero.
pub(crate) fn div_round(numerator: i128, denominator: i128) -> i128 {
    if denominator == 0 {
        return 0;
    }
    let negative = (numerator < 0) != (denominator < 0);
    let n = numerator.abs();
    let d = denominator.abs();
    let q = (n + d / 2) / d;
    if negative { -q } else { q }
}
