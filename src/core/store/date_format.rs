//! Renders a timestamp through a spreadsheet number-format pattern
//! (`yyyy/mm/dd`, `d mmm yyyy`, `h:mm AM/PM`, ...) so it can be compared to
//! a cell's displayed text.

use chrono::{Datelike, NaiveDateTime, Timelike};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Day(usize),
    Month(usize),
    Minute(usize),
    /// `m`/`mm` before resolution into month or minute.
    MonthOrMinute(usize),
    Year(usize),
    Hour(usize),
    Second(usize),
    Fraction(usize),
    Meridiem { long: bool, lower: bool },
}

impl Token {
    fn is_literal(&self) -> bool {
        matches!(self, Token::Literal(_))
    }
}

/// A parsed date/time display pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatePattern {
    tokens: Vec<Token>,
    twelve_hour: bool,
}

impl DatePattern {
    pub fn parse(pattern: &str) -> Self {
        let chars: Vec<char> = pattern.chars().collect();
        let mut tokens: Vec<Token> = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            match c {
                '"' => {
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len() && chars[end] != '"' {
                        end += 1;
                    }
                    push_literal(&mut tokens, chars[start..end].iter().collect());
                    i = end + 1;
                }
                '\\' => {
                    if let Some(next) = chars.get(i + 1) {
                        push_literal(&mut tokens, next.to_string());
                    }
                    i += 2;
                }
                '[' => {
                    // Elapsed-time markers keep their unit; colours and
                    // conditions are dropped.
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len() && chars[end] != ']' {
                        end += 1;
                    }
                    let inner: Vec<char> = chars[start..end].to_vec();
                    if let Some(first) = inner.first()
                        && inner.iter().all(|c| c.eq_ignore_ascii_case(first))
                    {
                        match first.to_ascii_lowercase() {
                            'h' => tokens.push(Token::Hour(inner.len())),
                            'm' => tokens.push(Token::Minute(inner.len())),
                            's' => tokens.push(Token::Second(inner.len())),
                            _ => {}
                        }
                    }
                    i = end + 1;
                }
                'a' | 'A' => {
                    if let Some((token, len)) = meridiem_at(&chars[i..]) {
                        tokens.push(token);
                        i += len;
                    } else {
                        push_literal(&mut tokens, c.to_string());
                        i += 1;
                    }
                }
                'd' | 'D' | 'm' | 'M' | 'y' | 'Y' | 'h' | 'H' | 's' | 'S' => {
                    let lower = c.to_ascii_lowercase();
                    let mut n = 1;
                    while i + n < chars.len() && chars[i + n].to_ascii_lowercase() == lower {
                        n += 1;
                    }
                    tokens.push(match lower {
                        'd' => Token::Day(n),
                        'm' if n <= 2 => Token::MonthOrMinute(n),
                        'm' => Token::Month(n),
                        'y' => Token::Year(n),
                        'h' => Token::Hour(n),
                        _ => Token::Second(n),
                    });
                    i += n;
                }
                '0' if previous_field(&tokens).is_some_and(|t| matches!(t, Token::Second(_))) => {
                    let mut n = 1;
                    while i + n < chars.len() && chars[i + n] == '0' {
                        n += 1;
                    }
                    tokens.push(Token::Fraction(n));
                    i += n;
                }
                _ => {
                    push_literal(&mut tokens, c.to_string());
                    i += 1;
                }
            }
        }

        resolve_minutes(&mut tokens);
        let twelve_hour = tokens.iter().any(|t| matches!(t, Token::Meridiem { .. }));
        Self {
            tokens,
            twelve_hour,
        }
    }

    /// Whether the pattern shows any part of a date or time. Purely numeric
    /// formats such as `0` or `#,##0` do not.
    pub fn has_date_fields(&self) -> bool {
        self.tokens.iter().any(|t| {
            matches!(
                t,
                Token::Day(_)
                    | Token::Month(_)
                    | Token::MonthOrMinute(_)
                    | Token::Year(_)
                    | Token::Hour(_)
                    | Token::Minute(_)
                    | Token::Second(_)
            )
        })
    }

    pub fn render(&self, at: &NaiveDateTime) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(s) => out.push_str(s),
                Token::Day(1) => out.push_str(&at.day().to_string()),
                Token::Day(2) => out.push_str(&format!("{:02}", at.day())),
                Token::Day(3) => out.push_str(&at.format("%a").to_string()),
                Token::Day(_) => out.push_str(&at.format("%A").to_string()),
                Token::Month(1) => out.push_str(&at.month().to_string()),
                Token::Month(2) => out.push_str(&format!("{:02}", at.month())),
                Token::Month(3) => out.push_str(&at.format("%b").to_string()),
                Token::Month(4) => out.push_str(&at.format("%B").to_string()),
                Token::Month(_) => out.push_str(&at.format("%B").to_string()[..1]),
                Token::Year(n) if *n <= 2 => {
                    out.push_str(&format!("{:02}", at.year().rem_euclid(100)))
                }
                Token::Year(_) => out.push_str(&format!("{:04}", at.year())),
                Token::Hour(n) => {
                    let hour = if self.twelve_hour {
                        match at.hour() % 12 {
                            0 => 12,
                            h => h,
                        }
                    } else {
                        at.hour()
                    };
                    out.push_str(&pad(hour, *n));
                }
                Token::Minute(n) | Token::MonthOrMinute(n) => out.push_str(&pad(at.minute(), *n)),
                Token::Second(n) => out.push_str(&pad(at.second(), *n)),
                Token::Fraction(n) => {
                    let nanos = format!("{:09}", at.nanosecond() % 1_000_000_000);
                    out.push_str(&nanos[..(*n).min(9)]);
                }
                Token::Meridiem { long, lower } => {
                    let am = at.hour() < 12;
                    let text = match (*long, am) {
                        (true, true) => "AM",
                        (true, false) => "PM",
                        (false, true) => "A",
                        (false, false) => "P",
                    };
                    if *lower {
                        out.push_str(&text.to_lowercase());
                    } else {
                        out.push_str(text);
                    }
                }
            }
        }
        out
    }
}

fn pad(value: u32, width: usize) -> String {
    if width >= 2 {
        format!("{:02}", value)
    } else {
        value.to_string()
    }
}

fn push_literal(tokens: &mut Vec<Token>, text: String) {
    if let Some(Token::Literal(prev)) = tokens.last_mut() {
        prev.push_str(&text);
    } else {
        tokens.push(Token::Literal(text));
    }
}

fn previous_field(tokens: &[Token]) -> Option<&Token> {
    tokens.iter().rev().find(|t| !t.is_literal())
}

fn meridiem_at(chars: &[char]) -> Option<(Token, usize)> {
    let lower = chars[0].is_ascii_lowercase();
    let text: String = chars.iter().take(5).collect::<String>().to_ascii_uppercase();
    if text == "AM/PM" {
        return Some((Token::Meridiem { long: true, lower }, 5));
    }
    if text.starts_with("A/P") {
        return Some((Token::Meridiem { long: false, lower }, 3));
    }
    None
}

/// `m`/`mm` read as minutes when they follow an hour or precede seconds.
fn resolve_minutes(tokens: &mut [Token]) {
    let fields: Vec<usize> = (0..tokens.len())
        .filter(|&i| !tokens[i].is_literal())
        .collect();
    for (pos, &idx) in fields.iter().enumerate() {
        let Token::MonthOrMinute(n) = tokens[idx] else {
            continue;
        };
        let after_hour = pos > 0 && matches!(tokens[fields[pos - 1]], Token::Hour(_));
        let before_second = fields
            .get(pos + 1)
            .is_some_and(|&next| matches!(tokens[next], Token::Second(_)));
        tokens[idx] = if after_hour || before_second {
            Token::Minute(n)
        } else {
            Token::Month(n)
        };
    }
}
