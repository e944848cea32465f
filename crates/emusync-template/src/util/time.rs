//! `$util.time`.

use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

use crate::value::Value;

pub(super) fn call(now: DateTime<Utc>, name: &str, args: &[Value]) -> Result<Value, String> {
  let value = match name {
    "nowISO8601" => Value::string(iso8601(now)),
    "nowEpochSeconds" => Value::Int(now.timestamp()),
    "nowEpochMilliSeconds" => Value::Int(now.timestamp_millis()),
    "nowFormatted" => {
      let pattern = string_arg(args, 0)?;
      let zone = zone_arg(args, 1)?;
      Value::string(format_java(now, pattern, zone)?)
    }
    "parseISO8601ToEpochMilliSeconds" => {
      let text = string_arg(args, 0)?;
      let parsed = DateTime::parse_from_rfc3339(text)
        .map_err(|e| format!("invalid ISO8601 timestamp '{}': {}", text, e))?;
      Value::Int(parsed.timestamp_millis())
    }
    "epochMilliSecondsToSeconds" => Value::Int(millis_arg(args, 0)? / 1000),
    "epochMilliSecondsToISO8601" => Value::string(iso8601(from_millis(millis_arg(args, 0)?)?)),
    "epochMilliSecondsToFormatted" => {
      let at = from_millis(millis_arg(args, 0)?)?;
      let pattern = string_arg(args, 1)?;
      let zone = zone_arg(args, 2)?;
      Value::string(format_java(at, pattern, zone)?)
    }
    "parseFormattedToEpochMilliSeconds" => {
      let text = string_arg(args, 0)?;
      let pattern = java_to_strftime(string_arg(args, 1)?)?;
      let zone = zone_arg(args, 2)?;
      let naive = NaiveDateTime::parse_from_str(text, &pattern)
        .or_else(|_| {
          NaiveDate::parse_from_str(text, &pattern).map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default())
        })
        .map_err(|e| format!("cannot parse '{}': {}", text, e))?;
      let local = zone
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| format!("ambiguous local time '{}'", text))?;
      Value::Int(local.timestamp_millis())
    }
    _ => return Err("unknown function".to_string()),
  };
  Ok(value)
}

fn iso8601(at: DateTime<Utc>) -> String {
  at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn string_arg(args: &[Value], index: usize) -> Result<&str, String> {
  args
    .get(index)
    .and_then(Value::as_str)
    .ok_or_else(|| format!("argument {} must be a string", index + 1))
}

fn millis_arg(args: &[Value], index: usize) -> Result<i64, String> {
  match args.get(index) {
    Some(Value::Int(i)) => Ok(*i),
    Some(Value::Float(f)) => Ok(*f as i64),
    _ => Err(format!("argument {} must be a number", index + 1)),
  }
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>, String> {
  Utc
    .timestamp_millis_opt(millis)
    .single()
    .ok_or_else(|| format!("epoch milliseconds {} out of range", millis))
}

/// Optional zone argument: `UTC`, `Z`, `GMT` or a fixed offset like `+08:00`.
fn zone_arg(args: &[Value], index: usize) -> Result<FixedOffset, String> {
  let utc = FixedOffset::east_opt(0).ok_or("invalid offset")?;
  let zone = match args.get(index) {
    None | Some(Value::Undefined) | Some(Value::Null) => return Ok(utc),
    Some(Value::String(zone)) => zone.trim(),
    Some(_) => return Err(format!("argument {} must be a string", index + 1)),
  };
  if matches!(zone, "UTC" | "Z" | "GMT" | "Etc/UTC") {
    return Ok(utc);
  }
  let offset = zone
    .strip_prefix("UTC")
    .or_else(|| zone.strip_prefix("GMT"))
    .unwrap_or(zone);
  offset
    .parse::<FixedOffset>()
    .or_else(|_| parse_compact_offset(offset))
    .map_err(|_| format!("unsupported time zone '{}'", zone))
}

fn parse_compact_offset(offset: &str) -> Result<FixedOffset, ()> {
  let (sign, digits) = match offset.as_bytes().first() {
    Some(b'+') => (1, &offset[1..]),
    Some(b'-') => (-1, &offset[1..]),
    _ => return Err(()),
  };
  if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
    return Err(());
  }
  let hours: i32 = digits[..2].parse().map_err(|_| ())?;
  let minutes: i32 = digits[2..].parse().map_err(|_| ())?;
  FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or(())
}

fn format_java(at: DateTime<Utc>, pattern: &str, zone: FixedOffset) -> Result<String, String> {
  let strftime = java_to_strftime(pattern)?;
  let items: Vec<Item<'_>> = StrftimeItems::new(&strftime).collect();
  if items.iter().any(|item| matches!(item, Item::Error)) {
    return Err(format!("unsupported date pattern '{}'", pattern));
  }
  let mut out = String::new();
  write!(out, "{}", at.with_timezone(&zone).format_with_items(items.into_iter()))
    .map_err(|_| format!("cannot format date with pattern '{}'", pattern))?;
  Ok(out)
}

/// Translate a Java `DateTimeFormatter` pattern into a chrono strftime string.
fn java_to_strftime(pattern: &str) -> Result<String, String> {
  let chars: Vec<char> = pattern.chars().collect();
  let mut out = String::new();
  let mut i = 0;

  while i < chars.len() {
    let c = chars[i];
    if c == '\'' {
      if chars.get(i + 1) == Some(&'\'') {
        out.push('\'');
        i += 2;
        continue;
      }
      i += 1;
      while i < chars.len() && chars[i] != '\'' {
        push_literal(&mut out, chars[i]);
        i += 1;
      }
      i += 1;
      continue;
    }

    if !c.is_ascii_alphabetic() {
      push_literal(&mut out, c);
      i += 1;
      continue;
    }

    let mut run = 1;
    while chars.get(i + run) == Some(&c) {
      run += 1;
    }
    let spec = match (c, run) {
      ('y' | 'u', 2) => "%y",
      ('y' | 'u', _) => "%Y",
      ('M', 1) => "%-m",
      ('M', 2) => "%m",
      ('M', 3) => "%b",
      ('M', _) => "%B",
      ('d', 1) => "%-d",
      ('d', _) => "%d",
      ('D', _) => "%j",
      ('H', 1) => "%-H",
      ('H', _) => "%H",
      ('h', 1) => "%-I",
      ('h', _) => "%I",
      ('m', 1) => "%-M",
      ('m', _) => "%M",
      ('s', 1) => "%-S",
      ('s', _) => "%S",
      ('S', 1..=3) => "%3f",
      ('S', 4..=6) => "%6f",
      ('S', _) => "%9f",
      ('a', _) => "%p",
      ('E', 1..=3) => "%a",
      ('E', _) => "%A",
      ('Z', _) => "%z",
      ('X' | 'x', 1 | 2) => "%z",
      ('X' | 'x', _) => "%:z",
      ('z', _) => "%Z",
      _ => return Err(format!("unsupported pattern letter '{}'", c)),
    };
    out.push_str(spec);
    i += run;
  }
  Ok(out)
}

fn push_literal(out: &mut String, c: char) {
  if c == '%' {
    out.push_str("%%");
  } else {
    out.push(c);
  }
}
