// Piece codec: `^`-delimited composite values, multi-line fields, FileMan and HOROLOG dates.
use time::macros::{date, format_description};
use time::{Date, Duration, Month, PrimitiveDateTime, Time};

use crate::core::error::{Error, ErrorKind};

pub const PIECE_DELIMITER: char = '^';
/// Lines probed when a multi-line header carries no usable count.
pub const MULTI_LINE_PROBE: u32 = 10;
pub const INVALID_HOROLOG: &str = "<invalid HOROLOG format>";

const HOROLOG_EPOCH: Date = date!(1840 - 12 - 31);

pub fn decode_pieces(raw: &str, delimiter: char) -> Vec<&str> {
    raw.split(delimiter).collect()
}

/// 1-based piece `n` of `raw` using `^`. Empty when `raw` is absent or empty,
/// or when `n` is 0 or past the last piece.
pub fn get_piece(raw: Option<&str>, n: usize) -> &str {
    get_piece_with(raw, n, PIECE_DELIMITER)
}

pub fn get_piece_with(raw: Option<&str>, n: usize, delimiter: char) -> &str {
    let Some(raw) = raw else {
        return "";
    };
    if raw.is_empty() || n == 0 {
        return "";
    }
    raw.split(delimiter).nth(n - 1).unwrap_or("")
}

/// Reads a multi-line field: the header's third piece is the line count; when
/// it is absent or not a number, lines `1..=10` are probed. Lines that are
/// missing or fail to read are skipped, and a run of ten of them in a row ends
/// the read even when the header claims more.
pub fn decode_multi_line<F>(header: Option<&str>, mut read_line: F) -> Vec<String>
where
    F: FnMut(u32) -> Result<Option<String>, Error>,
{
    let count = get_piece(header, 3)
        .trim()
        .parse::<u32>()
        .unwrap_or(MULTI_LINE_PROBE);
    let mut lines = Vec::new();
    let mut gap = 0;
    for line_no in 1..=count {
        match read_line(line_no) {
            Ok(Some(line)) => {
                lines.push(line);
                gap = 0;
                continue;
            }
            Ok(None) => {}
            Err(err) => {
                tracing::debug!(line_no, error = %err, "skipping unreadable line");
            }
        }
        gap += 1;
        if gap >= MULTI_LINE_PROBE {
            if count > line_no {
                tracing::debug!(line_no, count, "header count overshoots stored lines");
            }
            break;
        }
    }
    lines
}

fn format_error(raw: &str, message: &str) -> Error {
    Error::new(ErrorKind::Format).with_message(format!("{message}: {raw:?}"))
}

fn two_digits(raw: &str, digits: &str) -> Result<u8, Error> {
    digits
        .parse::<u8>()
        .map_err(|_| format_error(raw, "non-numeric FileMan date"))
}

/// FileMan date `YYYMMDD[.HHMMSS]`, where `YYY` is years since 1700.
pub fn decode_fileman_date(raw: &str) -> Result<Date, Error> {
    let trimmed = raw.trim();
    let int_part = trimmed.split('.').next().unwrap_or("");
    if int_part.len() < 7 {
        return Err(format_error(raw, "FileMan date too short"));
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format_error(raw, "non-numeric FileMan date"));
    }
    let years: i32 = int_part[..3]
        .parse()
        .map_err(|_| format_error(raw, "non-numeric FileMan date"))?;
    let month = two_digits(raw, &int_part[3..5])?;
    let day = two_digits(raw, &int_part[5..7])?;
    let month = Month::try_from(month).map_err(|_| format_error(raw, "invalid FileMan month"))?;
    Date::from_calendar_date(1700 + years, month, day)
        .map_err(|_| format_error(raw, "invalid FileMan calendar date"))
}

/// FileMan date with its optional `.HHMMSS` fraction (right-padded with zeros).
pub fn decode_fileman_datetime(raw: &str) -> Result<PrimitiveDateTime, Error> {
    let date = decode_fileman_date(raw)?;
    let frac = raw.trim().split_once('.').map(|(_, frac)| frac).unwrap_or("");
    if frac.is_empty() {
        return Ok(PrimitiveDateTime::new(date, Time::MIDNIGHT));
    }
    if frac.len() > 6 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format_error(raw, "invalid FileMan time"));
    }
    let padded = format!("{frac:0<6}");
    let hour = two_digits(raw, &padded[0..2])?;
    let minute = two_digits(raw, &padded[2..4])?;
    let second = two_digits(raw, &padded[4..6])?;
    // FileMan writes midnight at the end of a day as hour 24.
    if hour == 24 && minute == 0 && second == 0 {
        let next = date
            .next_day()
            .ok_or_else(|| format_error(raw, "FileMan date out of range"))?;
        return Ok(PrimitiveDateTime::new(next, Time::MIDNIGHT));
    }
    let time = Time::from_hms(hour, minute, second)
        .map_err(|_| format_error(raw, "invalid FileMan time"))?;
    Ok(PrimitiveDateTime::new(date, time))
}

/// `MM/DD/YYYY`, or `Invalid Date (<raw>)` when the input does not decode.
pub fn render_fileman_date(raw: &str) -> String {
    let format = format_description!("[month]/[day]/[year]");
    decode_fileman_date(raw)
        .ok()
        .and_then(|date| date.format(&format).ok())
        .unwrap_or_else(|| format!("Invalid Date ({raw})"))
}

/// `YYYY-MM-DD HH:MM`; `YYYY-MM-DD` when only the time fraction is bad, and
/// `Invalid Date (<raw>)` when the date itself does not decode.
pub fn render_fileman_datetime(raw: &str) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]");
    let date_only = format_description!("[year]-[month]-[day]");
    match decode_fileman_datetime(raw) {
        Ok(ts) => ts.format(&format).ok(),
        Err(_) => decode_fileman_date(raw).ok().and_then(|date| date.format(&date_only).ok()),
    }
    .unwrap_or_else(|| format!("Invalid Date ({raw})"))
}

/// HOROLOG `days,seconds`: days since 1840-12-31 and seconds since midnight.
pub fn decode_horolog(raw: &str) -> Result<PrimitiveDateTime, Error> {
    let (days, seconds) = raw
        .trim()
        .split_once(',')
        .ok_or_else(|| format_error(raw, "HOROLOG needs days,seconds"))?;
    let days: i64 = days
        .trim()
        .parse()
        .map_err(|_| format_error(raw, "non-numeric HOROLOG days"))?;
    let seconds: i64 = seconds
        .trim()
        .parse()
        .map_err(|_| format_error(raw, "non-numeric HOROLOG seconds"))?;
    PrimitiveDateTime::new(HOROLOG_EPOCH, Time::MIDNIGHT)
        .checked_add(Duration::days(days))
        .and_then(|ts| ts.checked_add(Duration::seconds(seconds)))
        .ok_or_else(|| format_error(raw, "HOROLOG out of range"))
}

/// `YYYY-MM-DD HH:MM:SS`, or `<invalid HOROLOG format>`.
pub fn render_horolog(raw: &str) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    decode_horolog(raw)
        .ok()
        .and_then(|ts| ts.format(&format).ok())
        .unwrap_or_else(|| INVALID_HOROLOG.to_string())
}

/// Whole years between `dob` and `today`; `None` when `dob` is in the future.
pub fn age_on(dob: Date, today: Date) -> Option<u32> {
    if dob > today {
        return None;
    }
    let mut years = today.year() - dob.year();
    if (today.month() as u8, today.day()) < (dob.month() as u8, dob.day()) {
        years -= 1;
    }
    u32::try_from(years).ok()
}
