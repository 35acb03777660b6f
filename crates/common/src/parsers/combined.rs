//! Apache/nginx "combined" log line parser, built with `nom` combinators,
//! generalized over two profiles and producing a [`Record`] instead of a
//! bespoke log struct.

use chrono::{DateTime, NaiveDateTime, Utc};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while1},
    character::complete::{char, digit1, space1},
    combinator::map_res,
    number::complete::double,
    sequence::delimited,
    IResult,
};

use crate::model::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Combined,
    CombinedTime,
}

impl LogFormat {
    pub fn from_profile_name(name: &str) -> Option<Self> {
        match name {
            "combined" => Some(LogFormat::Combined),
            "combined_time" | "combined+time" => Some(LogFormat::CombinedTime),
            _ => None,
        }
    }
}

fn parse_token(input: &str) -> IResult<&str, String> {
    let (input, token) = take_while1(|c: char| {
        c.is_alphanumeric() || c == '.' || c == ':' || c == '-' || c == '_' || c == '@'
    })(input)?;
    Ok((input, token.to_string()))
}

/// `[15/Dec/2025:17:19:00 +0000]`. On any parse failure callers substitute
/// the current wall clock instead of propagating an error.
fn parse_timestamp(input: &str) -> IResult<&str, DateTime<Utc>> {
    let (input, _) = char('[')(input)?;
    let (input, day) = digit1(input)?;
    let (input, _) = char('/')(input)?;
    let (input, month) = take_while1(|c: char| c.is_alphabetic())(input)?;
    let (input, _) = char('/')(input)?;
    let (input, year) = digit1(input)?;
    let (input, _) = char(':')(input)?;
    let (input, hour) = digit1(input)?;
    let (input, _) = char(':')(input)?;
    let (input, minute) = digit1(input)?;
    let (input, _) = char(':')(input)?;
    let (input, second) = digit1(input)?;
    let (input, _) = space1(input)?;
    let (input, _timezone) =
        take_while1(|c: char| c == '+' || c == '-' || c.is_ascii_digit())(input)?;
    let (input, _) = char(']')(input)?;

    let month_num = match month {
        "Jan" => 1,
        "Feb" => 2,
        "Mar" => 3,
        "Apr" => 4,
        "May" => 5,
        "Jun" => 6,
        "Jul" => 7,
        "Aug" => 8,
        "Sep" => 9,
        "Oct" => 10,
        "Nov" => 11,
        "Dec" => 12,
        _ => 1,
    };

    let datetime_str = format!(
        "{}-{:02}-{:02} {:02}:{:02}:{:02}",
        year,
        month_num,
        day.parse::<u32>().unwrap_or(1),
        hour.parse::<u32>().unwrap_or(0),
        minute.parse::<u32>().unwrap_or(0),
        second.parse::<u32>().unwrap_or(0)
    );

    let timestamp = NaiveDateTime::parse_from_str(&datetime_str, "%Y-%m-%d %H:%M:%S")
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok((input, timestamp))
}

/// `"GET /path?x=1 HTTP/1.1"` split into method, full target, and protocol.
fn parse_request_line(input: &str) -> IResult<&str, (String, String)> {
    let (input, _) = char('"')(input)?;
    let (input, method) = take_while1(|c: char| c.is_alphabetic())(input)?;
    let (input, _) = space1(input)?;
    let (input, target) = take_until(" HTTP")(input)?;
    let (input, _) = space1(input)?;
    let (input, _protocol) = take_until("\"")(input)?;
    let (input, _) = char('"')(input)?;
    Ok((input, (method.to_string(), target.to_string())))
}

fn parse_status(input: &str) -> IResult<&str, u16> {
    map_res(digit1, |s: &str| s.parse::<u16>())(input)
}

fn parse_size(input: &str) -> IResult<&str, u64> {
    alt((
        map_res(digit1, |s: &str| s.parse::<u64>()),
        map_res(char('-'), |_| Ok::<u64, std::num::ParseIntError>(0)),
    ))(input)
}

fn parse_quoted(input: &str) -> IResult<&str, String> {
    delimited(char('"'), take_until("\""), char('"'))(input).map(|(i, s)| (i, s.to_string()))
}

fn parse_fields(input: &str, format: LogFormat) -> IResult<&str, Record> {
    let (input, address) = parse_token(input)?;
    let (input, _) = space1(input)?;
    let (input, _remote_logname) = tag("-")(input)?;
    let (input, _) = space1(input)?;
    // %u: "-" when unauthenticated, otherwise the authenticated username.
    let (input, _auth_user) = parse_token(input)?;
    let (input, _) = space1(input)?;
    let (input, timestamp) = parse_timestamp(input)?;
    let (input, _) = space1(input)?;
    let (input, (method, target)) = parse_request_line(input)?;
    let (input, _) = space1(input)?;
    let (input, status) = parse_status(input)?;
    let (input, _) = space1(input)?;
    let (input, size) = parse_size(input)?;
    let (input, _) = space1(input)?;
    let (input, referer) = parse_quoted(input)?;
    let (input, _) = space1(input)?;
    let (input, user_agent) = parse_quoted(input)?;

    let (input, request_duration) = match format {
        LogFormat::CombinedTime => {
            let (input, _) = space1(input)?;
            let (input, duration) = double(input)?;
            (input, Some(duration))
        }
        LogFormat::Combined => (input, None),
    };

    let (path, query_string) = match target.split_once('?') {
        Some((p, q)) => (p.to_string(), q.to_string()),
        None => (target, String::new()),
    };

    Ok((
        input,
        Record {
            timestamp,
            address,
            user_agent,
            method,
            path,
            query_string,
            status,
            response_size: size,
            referer,
            request_duration,
            raw_line: String::new(),
            base_hash: None,
            behavior_hash: None,
        },
    ))
}

/// Parse a single log line under the given profile. A line that fails the
/// entire grammar is reported as `None`; the tailer counts it but never
/// surfaces a hard error.
pub fn parse_line(line: &str, format: LogFormat) -> Option<Record> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let (_, mut record) = parse_fields(trimmed, format).ok()?;
    record.raw_line = trimmed.to_string();
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_combined_profile() {
        let line = r#"203.0.113.10 - - [15/Dec/2025:17:19:00 +0000] "GET /index.html?x=1 HTTP/1.1" 200 1234 "https://example.com" "Mozilla/5.0""#;
        let record = parse_line(line, LogFormat::Combined).expect("should parse");
        assert_eq!(record.address, "203.0.113.10");
        assert_eq!(record.method, "GET");
        assert_eq!(record.path, "/index.html");
        assert_eq!(record.query_string, "x=1");
        assert_eq!(record.status, 200);
        assert_eq!(record.response_size, 1234);
        assert_eq!(record.request_duration, None);
    }

    #[test]
    fn parses_combined_time_profile() {
        let line = r#"203.0.113.10 - - [15/Dec/2025:17:19:00 +0000] "GET / HTTP/1.1" 200 0 "-" "curl/7.88" 0.042"#;
        let record = parse_line(line, LogFormat::CombinedTime).expect("should parse");
        assert_eq!(record.request_duration, Some(0.042));
    }

    #[test]
    fn authenticated_user_field_does_not_fail_the_line() {
        let line = r#"203.0.113.10 - jsmith [15/Dec/2025:17:19:00 +0000] "GET /account HTTP/1.1" 200 512 "-" "Mozilla/5.0""#;
        let record = parse_line(line, LogFormat::Combined).expect("should parse");
        assert_eq!(record.address, "203.0.113.10");
        assert_eq!(record.path, "/account");
    }

    #[test]
    fn dash_size_maps_to_zero() {
        let line = r#"198.51.100.20 - - [15/Dec/2025:17:19:00 +0000] "GET /admin HTTP/1.1" 404 - "-" "sqlmap/1.0""#;
        let record = parse_line(line, LogFormat::Combined).expect("should parse");
        assert_eq!(record.response_size, 0);
    }

    #[test]
    fn malformed_line_fails_whole_regex() {
        let line = "not a log line at all";
        assert!(parse_line(line, LogFormat::Combined).is_none());
    }

    #[test]
    fn unparsable_timestamp_falls_back_to_now() {
        // Month name is bogus; timestamp parsing inside parse_timestamp
        // degrades to `Utc::now()` rather than failing the whole line.
        let line = r#"203.0.113.10 - - [15/Zzz/2025:17:19:00 +0000] "GET / HTTP/1.1" 200 0 "-" "Mozilla/5.0""#;
        let record = parse_line(line, LogFormat::Combined).expect("should still parse");
        assert!(record.timestamp.timestamp() > 0);
    }
}
