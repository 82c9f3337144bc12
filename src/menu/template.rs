use crate::error::ConfigError;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

fn slot_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)(\.\.\.)?\}").expect("static slot regex")
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Text(String),
    Slot(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Word(Vec<Segment>),
    // `{name...}` as a whole token: the value is split into several arguments
    Splat(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandTemplate {
    raw: String,
    tokens: Vec<Token>,
    params: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolveError {
    MissingParameter(String),
    UnbalancedQuotes(String),
    Empty,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::MissingParameter(p) => write!(f, "missing value for '{p}'"),
            ResolveError::UnbalancedQuotes(p) => write!(f, "unbalanced quotes in '{p}'"),
            ResolveError::Empty => write!(f, "command resolves to nothing"),
        }
    }
}

/// A template with every parameter substituted, ready to hand to the OS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub argv: Vec<String>,
    pub params: Vec<(String, String)>,
}

impl ResolvedCommand {
    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn display(&self) -> String {
        self.argv
            .iter()
            .map(|a| {
                shlex::try_quote(a)
                    .map(|q| q.into_owned())
                    .unwrap_or_else(|_| a.clone())
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn parse_word(owner: &str, word: &str) -> Result<Token, ConfigError> {
    let malformed = || ConfigError::MalformedPlaceholder {
        id: owner.to_string(),
        token: word.to_string(),
    };
    let re = slot_re();
    if let Some(caps) = re.captures(word) {
        let whole = caps.get(0).map(|m| m.as_str() == word).unwrap_or(false);
        if caps.get(2).is_some() {
            // a splat must stand alone
            if !whole || re.find_iter(word).count() > 1 {
                return Err(malformed());
            }
            return Ok(Token::Splat(caps[1].to_string()));
        }
    }
    let mut segments = Vec::new();
    let mut last = 0;
    for caps in re.captures_iter(word) {
        let m = caps.get(0).ok_or_else(malformed)?;
        if caps.get(2).is_some() {
            return Err(malformed());
        }
        if m.start() > last {
            segments.push(Segment::Text(word[last..m.start()].to_string()));
        }
        segments.push(Segment::Slot(caps[1].to_string()));
        last = m.end();
    }
    if last < word.len() {
        segments.push(Segment::Text(word[last..].to_string()));
    }
    let stray = segments
        .iter()
        .any(|s| matches!(s, Segment::Text(t) if t.contains('{') || t.contains('}')));
    if stray {
        return Err(malformed());
    }
    Ok(Token::Word(segments))
}

impl CommandTemplate {
    pub fn parse(owner: &str, raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Err(ConfigError::EmptyTemplate {
                id: owner.to_string(),
            });
        }
        let words = shlex::split(raw).ok_or_else(|| ConfigError::UnbalancedQuotes {
            id: owner.to_string(),
            template: raw.to_string(),
        })?;
        let tokens = words
            .iter()
            .map(|w| parse_word(owner, w))
            .collect::<Result<Vec<_>, _>>()?;
        let mut params: Vec<String> = Vec::new();
        let mut note = |name: &String| {
            if !params.contains(name) {
                params.push(name.clone());
            }
        };
        for t in &tokens {
            match t {
                Token::Splat(name) => note(name),
                Token::Word(segs) => {
                    for s in segs {
                        if let Segment::Slot(name) = s {
                            note(name);
                        }
                    }
                }
            }
        }
        Ok(Self {
            raw: raw.to_string(),
            tokens,
            params,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn is_parameterized(&self) -> bool {
        !self.params.is_empty()
    }

    /// The program name when it is fixed by the template (not supplied by a parameter).
    pub fn program(&self) -> Option<&str> {
        match self.tokens.first()? {
            Token::Word(segs) => match segs.as_slice() {
                [Segment::Text(t)] => Some(t.as_str()),
                _ => None,
            },
            Token::Splat(_) => None,
        }
    }

    pub fn resolve(&self, values: &[(String, String)]) -> Result<ResolvedCommand, ResolveError> {
        let lookup = |name: &str| {
            values
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
                .ok_or_else(|| ResolveError::MissingParameter(name.to_string()))
        };
        let mut argv = Vec::new();
        for t in &self.tokens {
            match t {
                Token::Splat(name) => {
                    let v = lookup(name)?;
                    let parts = shlex::split(v)
                        .ok_or_else(|| ResolveError::UnbalancedQuotes(name.clone()))?;
                    argv.extend(parts);
                }
                Token::Word(segs) => {
                    let mut arg = String::new();
                    for s in segs {
                        match s {
                            Segment::Text(t) => arg.push_str(t),
                            Segment::Slot(name) => arg.push_str(lookup(name)?),
                        }
                    }
                    argv.push(arg);
                }
            }
        }
        if argv.first().map(|p| p.is_empty()).unwrap_or(true) {
            return Err(ResolveError::Empty);
        }
        let params = self
            .params
            .iter()
            .filter_map(|p| lookup(p).ok().map(|v| (p.clone(), v.to_string())))
            .collect();
        Ok(ResolvedCommand { argv, params })
    }
}
