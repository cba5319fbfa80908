use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde_json::{Map, Value};
use switchboard_core::domain::capability::{looks_like_email, DATETIME_FORMAT};
use switchboard_core::{ArgumentKind, ArgumentSchema, ArgumentSpec, Arguments, DispatchError};

const CONTACT_TRIGGERS: [&str; 14] = [
    "with", "to", "for", "email", "emailing", "cc", "call", "invite", "remind", "tell", "ask",
    "message", "meet", "ping",
];
const PRONOUNS: [&str; 3] = ["him", "her", "them"];
const NOT_NAMES: [&str; 22] = [
    "i", "me", "we", "us", "you", "the", "a", "an", "it", "today", "tomorrow", "tonight",
    "noon", "midnight", "monday", "tuesday", "wednesday", "thursday", "friday", "saturday",
    "sunday", "next",
];
const TOPIC_MARKERS: [&str; 5] = ["about", "regarding", "titled", "called", "re"];
const TOPIC_STOPS: [&str; 9] =
    ["with", "at", "by", "on", "tomorrow", "today", "tonight", "priority", "due"];
const DEFAULT_HOUR: u32 = 9;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contact {
    pub name: String,
    pub email: Option<String>,
}

/// Known contacts supplied by the caller in `context.contacts`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContactDirectory {
    contacts: Vec<Contact>,
}

impl ContactDirectory {
    pub fn new(contacts: Vec<Contact>) -> Self {
        Self { contacts }
    }

    /// Accepts an array of names or `{ "name": .., "email": .. }` objects.
    pub fn from_context(context: &Map<String, Value>) -> Result<Self, DispatchError> {
        let Some(raw) = context.get("contacts") else {
            return Ok(Self::default());
        };
        let entries = raw.as_array().ok_or_else(|| {
            DispatchError::InvalidArguments("context.contacts must be an array".to_string())
        })?;

        let mut contacts = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let contact = match entry {
                Value::String(name) => Contact { name: name.trim().to_string(), email: None },
                Value::Object(fields) => Contact {
                    name: fields
                        .get("name")
                        .and_then(Value::as_str)
                        .map(|name| name.trim().to_string())
                        .unwrap_or_default(),
                    email: fields.get("email").and_then(Value::as_str).map(str::to_string),
                },
                _ => {
                    return Err(DispatchError::InvalidArguments(format!(
                        "context.contacts[{index}] must be a string or an object with a name"
                    )))
                }
            };
            if contact.name.is_empty() {
                return Err(DispatchError::InvalidArguments(format!(
                    "context.contacts[{index}] has an empty name"
                )));
            }
            contacts.push(contact);
        }

        Ok(Self { contacts })
    }

    pub fn resolve(&self, mention: &str) -> Option<&Contact> {
        let mention = mention.trim();
        self.contacts
            .iter()
            .find(|contact| contact.name.eq_ignore_ascii_case(mention))
            .or_else(|| {
                self.contacts.iter().find(|contact| first_name(&contact.name).eq_ignore_ascii_case(mention))
            })
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }
}

pub struct ExtractionInput<'a> {
    pub instruction: &'a str,
    pub context: &'a Map<String, Value>,
    pub directory: &'a ContactDirectory,
    /// Contacts from earlier turns of the same session, newest first.
    pub recent_contacts: &'a [String],
    pub now: NaiveDateTime,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Extraction {
    pub arguments: Arguments,
    pub missing: Vec<String>,
    pub contacts: Vec<String>,
}

impl Extraction {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Fills each declared argument from, in order: an explicit context value,
/// the instruction text, the declared default.
pub fn extract_arguments(schema: &ArgumentSchema, input: &ExtractionInput<'_>) -> Extraction {
    let mut scan = InstructionScan::new(input.instruction, input.directory);
    let mut extraction = Extraction::default();

    for field in schema.iter() {
        let value = input
            .context
            .get(&field.name)
            .and_then(|value| normalize_context_value(&field.spec.kind, value, input))
            .or_else(|| scan.take(&field.spec, input))
            .or_else(|| field.spec.default.clone());

        match value {
            Some(value) => {
                if matches!(field.spec.kind, ArgumentKind::Contact) {
                    if let Some(name) = value.as_str() {
                        remember(&mut extraction.contacts, name);
                    }
                }
                extraction.arguments.insert(field.name.clone(), value);
            }
            None if field.spec.required => extraction.missing.push(field.name.clone()),
            None => {}
        }
    }

    for contact in scan.resolved_contacts {
        remember(&mut extraction.contacts, &contact);
    }

    extraction
}

fn normalize_context_value(
    kind: &ArgumentKind,
    value: &Value,
    input: &ExtractionInput<'_>,
) -> Option<Value> {
    let raw = value.as_str()?.trim();
    if raw.is_empty() {
        return None;
    }

    let normalized = match kind {
        ArgumentKind::Text => raw.to_string(),
        ArgumentKind::Contact => input
            .directory
            .resolve(raw)
            .map(|contact| contact.name.clone())
            .unwrap_or_else(|| raw.to_string()),
        ArgumentKind::EmailAddress => {
            if looks_like_email(raw) {
                raw.to_string()
            } else {
                input.directory.resolve(raw)?.email.clone()?
            }
        }
        ArgumentKind::DateTime => {
            let parsed = NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT)
                .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
                .ok()
                .or_else(|| parse_when(&tokenize(raw).lowered, input.now))?;
            parsed.format(DATETIME_FORMAT).to_string()
        }
        ArgumentKind::Choice(options) => {
            options.iter().find(|option| option.eq_ignore_ascii_case(raw))?.clone()
        }
    };

    Some(Value::String(normalized))
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Mention {
    Name(String),
    Pronoun,
}

struct Tokens {
    cleaned: Vec<String>,
    lowered: Vec<String>,
}

/// Per-instruction extraction state. Each quoted segment, contact mention and
/// email address is handed out once so two fields never share a value.
struct InstructionScan<'a> {
    instruction: &'a str,
    tokens: Tokens,
    quoted: Vec<String>,
    topic: Option<String>,
    mentions: Vec<Mention>,
    emails: Vec<String>,
    next_quoted: usize,
    next_mention: usize,
    next_email: usize,
    next_email_mention: usize,
    resolved_contacts: Vec<String>,
}

impl<'a> InstructionScan<'a> {
    fn new(instruction: &'a str, directory: &ContactDirectory) -> Self {
        let tokens = tokenize(instruction);
        let quoted = quoted_segments(instruction);
        let topic = topic_phrase(instruction);
        let mentions = contact_mentions(&tokens, directory);
        let emails = tokens.cleaned.iter().filter(|token| looks_like_email(token)).cloned().collect();

        Self {
            instruction,
            tokens,
            quoted,
            topic,
            mentions,
            emails,
            next_quoted: 0,
            next_mention: 0,
            next_email: 0,
            next_email_mention: 0,
            resolved_contacts: Vec::new(),
        }
    }

    fn take(&mut self, spec: &ArgumentSpec, input: &ExtractionInput<'_>) -> Option<Value> {
        let value = match &spec.kind {
            ArgumentKind::Text => self.take_text(spec.whole_instruction),
            ArgumentKind::Contact => self.take_contact(input),
            ArgumentKind::EmailAddress => self.take_email(input),
            ArgumentKind::DateTime => parse_when(&self.tokens.lowered, input.now)
                .map(|when| when.format(DATETIME_FORMAT).to_string()),
            ArgumentKind::Choice(options) => self.tokens.lowered.iter().find_map(|token| {
                options.iter().find(|option| option.eq_ignore_ascii_case(token)).cloned()
            }),
        };
        value.map(Value::String)
    }

    fn take_text(&mut self, whole_instruction: bool) -> Option<String> {
        if let Some(segment) = self.quoted.get(self.next_quoted) {
            self.next_quoted += 1;
            return Some(segment.clone());
        }
        if let Some(topic) = self.topic.take() {
            return Some(topic);
        }
        let trimmed = self.instruction.trim();
        (whole_instruction && !trimmed.is_empty()).then(|| trimmed.to_string())
    }

    fn take_contact(&mut self, input: &ExtractionInput<'_>) -> Option<String> {
        while let Some(mention) = self.mentions.get(self.next_mention).cloned() {
            self.next_mention += 1;
            let resolved = match mention {
                Mention::Name(name) => Some(
                    input.directory.resolve(&name).map(|contact| contact.name.clone()).unwrap_or(name),
                ),
                Mention::Pronoun => input.recent_contacts.first().cloned(),
            };
            if let Some(name) = resolved {
                return Some(name);
            }
        }
        // A bare address names the recipient as well.
        self.emails.get(self.next_email).cloned()
    }

    fn take_email(&mut self, input: &ExtractionInput<'_>) -> Option<String> {
        if let Some(email) = self.emails.get(self.next_email) {
            self.next_email += 1;
            return Some(email.clone());
        }

        while let Some(mention) = self.mentions.get(self.next_email_mention).cloned() {
            self.next_email_mention += 1;
            let name = match mention {
                Mention::Name(name) => name,
                Mention::Pronoun => match input.recent_contacts.first() {
                    Some(name) => name.clone(),
                    None => continue,
                },
            };
            if let Some(contact) = input.directory.resolve(&name) {
                if let Some(email) = &contact.email {
                    self.resolved_contacts.push(contact.name.clone());
                    return Some(email.clone());
                }
            }
        }
        None
    }
}

fn remember(contacts: &mut Vec<String>, name: &str) {
    if !contacts.iter().any(|known| known == name) {
        contacts.push(name.to_string());
    }
}

fn tokenize(text: &str) -> Tokens {
    let cleaned: Vec<String> = text
        .split_whitespace()
        .map(|token| {
            let trimmed = token.trim_matches(|character: char| !character.is_alphanumeric());
            trimmed
                .strip_suffix("'s")
                .or_else(|| trimmed.strip_suffix("\u{2019}s"))
                .unwrap_or(trimmed)
                .to_string()
        })
        .filter(|token| !token.is_empty())
        .collect();
    let lowered = cleaned.iter().map(|token| token.to_lowercase()).collect();
    Tokens { cleaned, lowered }
}

fn quoted_segments(text: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current: Option<String> = None;

    for character in text.chars() {
        let is_quote = matches!(character, '"' | '\u{201c}' | '\u{201d}');
        match (&mut current, is_quote) {
            (None, true) => current = Some(String::new()),
            (Some(segment), true) => {
                let trimmed = segment.trim().to_string();
                if !trimmed.is_empty() {
                    segments.push(trimmed);
                }
                current = None;
            }
            (Some(segment), false) => segment.push(character),
            (None, false) => {}
        }
    }

    segments
}

fn topic_phrase(text: &str) -> Option<String> {
    let raw: Vec<&str> = text.split_whitespace().collect();
    let start = raw.iter().position(|token| {
        let lowered = token.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
        TOPIC_MARKERS.contains(&lowered.as_str())
    })?;

    let mut words = Vec::new();
    for token in &raw[start + 1..] {
        let bare = token.trim_matches(|c: char| !c.is_alphanumeric());
        let lowered = bare.to_lowercase();
        let lowered = lowered.strip_suffix("'s").unwrap_or(&lowered);
        if TOPIC_STOPS.contains(&lowered) {
            break;
        }
        let ends_clause = token.ends_with([',', ';', '.', '!', '?']);
        let word = token.trim_end_matches([',', ';', '.', '!', '?']);
        if !word.is_empty() {
            words.push(word);
        }
        if ends_clause {
            break;
        }
    }

    let phrase = words.join(" ");
    let phrase = phrase.trim_matches(|c: char| c == '"' || c.is_whitespace());
    (!phrase.is_empty()).then(|| phrase.to_string())
}

fn contact_mentions(tokens: &Tokens, directory: &ContactDirectory) -> Vec<Mention> {
    let mut mentions = Vec::new();
    let mut index = 0;

    while index < tokens.cleaned.len() {
        let lowered = tokens.lowered[index].as_str();

        if PRONOUNS.contains(&lowered) {
            push_mention(&mut mentions, Mention::Pronoun);
            index += 1;
            continue;
        }

        let follows_trigger = CONTACT_TRIGGERS.contains(&lowered);
        if follows_trigger && tokens.cleaned.get(index + 1).is_some_and(|next| is_name_token(next)) {
            let mut end = index + 1;
            while end < tokens.cleaned.len() && is_name_token(&tokens.cleaned[end]) {
                end += 1;
            }
            push_mention(&mut mentions, Mention::Name(tokens.cleaned[index + 1..end].join(" ")));
            index = end;
            continue;
        }

        let token = &tokens.cleaned[index];
        if is_name_token(token) && directory.resolve(token).is_some() {
            push_mention(&mut mentions, Mention::Name(token.clone()));
        }
        index += 1;
    }

    mentions
}

fn push_mention(mentions: &mut Vec<Mention>, mention: Mention) {
    if !mentions.contains(&mention) {
        mentions.push(mention);
    }
}

fn is_name_token(token: &str) -> bool {
    let mut characters = token.chars();
    let Some(first) = characters.next() else {
        return false;
    };
    first.is_uppercase()
        && characters.all(|character| character.is_alphabetic() || matches!(character, '-' | '\''))
        && !NOT_NAMES.contains(&token.to_lowercase().as_str())
}

fn first_name(full_name: &str) -> &str {
    full_name.split_whitespace().next().unwrap_or(full_name)
}

pub(crate) fn parse_when(tokens: &[String], now: NaiveDateTime) -> Option<NaiveDateTime> {
    let date = parse_date(tokens, now.date());
    let time = parse_time(tokens);

    match (date, time) {
        (Some(date), Some(time)) => Some(date.and_time(time)),
        (Some(date), None) => date.and_hms_opt(DEFAULT_HOUR, 0, 0),
        (None, Some(time)) => {
            let today = now.date().and_time(time);
            Some(if today > now { today } else { today + Duration::days(1) })
        }
        (None, None) => None,
    }
}

fn parse_date(tokens: &[String], today: NaiveDate) -> Option<NaiveDate> {
    for (index, token) in tokens.iter().enumerate() {
        match token.as_str() {
            "today" | "tonight" => return Some(today),
            "tomorrow" => {
                let day_after = index >= 2 && tokens[index - 2] == "day" && tokens[index - 1] == "after";
                return Some(today + Duration::days(if day_after { 2 } else { 1 }));
            }
            _ => {}
        }
        if let Some(weekday) = parse_weekday(token) {
            return Some(next_weekday(today, weekday));
        }
        if let Ok(date) = NaiveDate::parse_from_str(token, "%Y-%m-%d") {
            return Some(date);
        }
    }
    None
}

fn parse_weekday(token: &str) -> Option<Weekday> {
    match token {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Next occurrence strictly after `today`.
fn next_weekday(today: NaiveDate, weekday: Weekday) -> NaiveDate {
    let current = i64::from(today.weekday().num_days_from_monday());
    let target = i64::from(weekday.num_days_from_monday());
    let mut ahead = (target - current).rem_euclid(7);
    if ahead == 0 {
        ahead = 7;
    }
    today + Duration::days(ahead)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Meridiem {
    Am,
    Pm,
}

fn parse_time(tokens: &[String]) -> Option<NaiveTime> {
    for (index, token) in tokens.iter().enumerate() {
        match token.as_str() {
            "noon" | "midday" => return NaiveTime::from_hms_opt(12, 0, 0),
            "midnight" => return NaiveTime::from_hms_opt(0, 0, 0),
            _ => {}
        }
        let next = tokens.get(index + 1).map(String::as_str);
        let after_at = index > 0 && tokens[index - 1] == "at";
        if let Some(time) = parse_clock(token, next, after_at) {
            return Some(time);
        }
    }
    None
}

fn parse_clock(token: &str, next: Option<&str>, after_at: bool) -> Option<NaiveTime> {
    let (body, attached) = split_meridiem(token);
    let meridiem = attached.or_else(|| next.and_then(meridiem_word));

    let (hour_part, minute_part) = match body.split_once(':') {
        Some((hour, minute)) => (hour, Some(minute)),
        None => (body, None),
    };
    if hour_part.is_empty() || hour_part.len() > 2 {
        return None;
    }
    let hour: u32 = hour_part.parse().ok()?;
    let minute: u32 = match minute_part {
        Some(minute) if minute.len() == 2 => minute.parse().ok()?,
        Some(_) => return None,
        None => 0,
    };

    match meridiem {
        Some(meridiem) => {
            if hour == 0 || hour > 12 {
                return None;
            }
            let hour = match (meridiem, hour) {
                (Meridiem::Am, 12) => 0,
                (Meridiem::Am, hour) => hour,
                (Meridiem::Pm, 12) => 12,
                (Meridiem::Pm, hour) => hour + 12,
            };
            NaiveTime::from_hms_opt(hour, minute, 0)
        }
        None if minute_part.is_some() => NaiveTime::from_hms_opt(hour, minute, 0),
        // "at 2" during business hours reads as the afternoon.
        None if after_at => {
            let hour = if (1..=7).contains(&hour) { hour + 12 } else { hour };
            NaiveTime::from_hms_opt(hour, 0, 0)
        }
        None => None,
    }
}

fn split_meridiem(token: &str) -> (&str, Option<Meridiem>) {
    for (suffix, meridiem) in
        [("p.m", Meridiem::Pm), ("pm", Meridiem::Pm), ("a.m", Meridiem::Am), ("am", Meridiem::Am)]
    {
        if let Some(body) = token.strip_suffix(suffix) {
            if body.chars().next().is_some_and(|character| character.is_ascii_digit()) {
                return (body, Some(meridiem));
            }
        }
    }
    (token, None)
}

fn meridiem_word(token: &str) -> Option<Meridiem> {
    match token {
        "pm" | "p.m" => Some(Meridiem::Pm),
        "am" | "a.m" => Some(Meridiem::Am),
        _ => None,
    }
}
