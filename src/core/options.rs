//! Purpose: Parse agent option strings into verbosity, always-emit, and skip policy.
//! Exports: `Options`, `Verbosity`, `SkipSet`, `ConfigIssue`, `Directive`, `parse`, `usage`.
//! Role: Option & policy store; evaluated once per load, immutable afterwards.
//! Invariants: Environment options come first; explicit options are applied after and win.
//! Invariants: Malformed tokens never fail parsing; they become `ConfigIssue`s.
//! Invariants: A bare `help` token short-circuits all other processing.
use std::fmt;

/// Environment variable holding a base option string.
pub const ENV_OPTIONS: &str = "NATIVE_WRAPPER_ARGS";

/// Maximum number of `skip=` entries.
pub const MAX_SKIP: usize = 64;

/// Plugin names longer than this (in bytes) are truncated.
pub const MAX_NAME_LEN: usize = 255;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, PartialOrd, Ord)]
pub enum Verbosity {
    Silent,
    #[default]
    Normal,
    Verbose,
}

impl Verbosity {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "silent" | "0" => Some(Verbosity::Silent),
            "normal" | "1" => Some(Verbosity::Normal),
            "verbose" | "2" => Some(Verbosity::Verbose),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SkipSet {
    names: Vec<String>,
}

impl SkipSet {
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|skipped| skipped == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    fn insert(&mut self, name: &str) -> Result<(), ConfigIssue> {
        let name = truncate_name(name);
        if self.contains(name) {
            return Ok(());
        }
        if self.names.len() >= MAX_SKIP {
            return Err(ConfigIssue::SkipCapacity {
                name: name.to_string(),
            });
        }
        self.names.push(name.to_string());
        Ok(())
    }
}

impl<'a> FromIterator<&'a str> for SkipSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = SkipSet::default();
        for name in iter {
            let _ = set.insert(name);
        }
        set
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Options {
    pub verbosity: Verbosity,
    pub always_emit: bool,
    pub skip: SkipSet,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfigIssue {
    InvalidLogLevel { value: String },
    InvalidAlways { value: String },
    UnknownKey { key: String },
    MissingValue { token: String },
    SkipCapacity { name: String },
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigIssue::InvalidLogLevel { value } => write!(
                f,
                "invalid log level: {value} (use silent/0, normal/1, or verbose/2)"
            ),
            ConfigIssue::InvalidAlways { value } => {
                write!(f, "invalid always value: {value} (use true/1 or false/0)")
            }
            ConfigIssue::UnknownKey { key } => write!(f, "unknown option: {key}"),
            ConfigIssue::MissingValue { token } => {
                write!(f, "invalid option format (expected key=value): {token}")
            }
            ConfigIssue::SkipCapacity { name } => write!(
                f,
                "maximum number of skipped plugins ({MAX_SKIP}) reached; ignoring {name}"
            ),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Parsed {
    pub options: Options,
    pub issues: Vec<ConfigIssue>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Directive {
    Activate(Parsed),
    Help,
}

/// Reads the base option string from [`ENV_OPTIONS`] and parses it together
/// with the explicit agent options.
pub fn from_env(explicit: Option<&str>) -> Directive {
    let base = std::env::var(ENV_OPTIONS).ok();
    parse(base.as_deref(), explicit)
}

pub fn parse(base: Option<&str>, explicit: Option<&str>) -> Directive {
    let mut parsed = Parsed::default();
    let tokens = [base, explicit]
        .into_iter()
        .flatten()
        .flat_map(|source| source.split(','))
        .map(|token| token.trim_start_matches([' ', '\t']))
        .filter(|token| !token.is_empty());

    for token in tokens {
        if token == "help" {
            return Directive::Help;
        }
        let Some((key, value)) = token.split_once('=') else {
            parsed.issues.push(ConfigIssue::MissingValue {
                token: token.to_string(),
            });
            continue;
        };
        match key {
            "log" => match Verbosity::parse(value) {
                Some(verbosity) => parsed.options.verbosity = verbosity,
                None => parsed.issues.push(ConfigIssue::InvalidLogLevel {
                    value: value.to_string(),
                }),
            },
            "always" => match value {
                "true" | "1" => parsed.options.always_emit = true,
                "false" | "0" => parsed.options.always_emit = false,
                _ => parsed.issues.push(ConfigIssue::InvalidAlways {
                    value: value.to_string(),
                }),
            },
            "skip" => {
                if let Err(issue) = parsed.options.skip.insert(value) {
                    parsed.issues.push(issue);
                }
            }
            _ => parsed.issues.push(ConfigIssue::UnknownKey {
                key: key.to_string(),
            }),
        }
    }

    Directive::Activate(parsed)
}

pub(crate) fn truncate_name(name: &str) -> &str {
    if name.len() <= MAX_NAME_LEN {
        return name;
    }
    let mut end = MAX_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

pub fn usage() -> String {
    format!(
        "\
hookmux - ClassFileLoadHook coordinator for JVMTI agents

Load this agent FIRST, before any other agent that registers a
ClassFileLoadHook callback.

USAGE:
  java -agentpath:<path>=<options> [other agents...] YourClass

OPTIONS (comma-separated):
  help            Print this message and continue without activating.
  log=<level>     silent|0, normal|1 (default), verbose|2
  always=<value>  true|1 writes a diff record for every event,
                  false|0 (default) only when a plugin changed the payload
  skip=<plugin>   Never deliver events to <plugin> and never record diffs
                  for it; repeatable (max {MAX_SKIP}).
                  Example: skip=instrument for the java.lang.instrument agent.

ENVIRONMENT:
  {ENV_OPTIONS}  Options applied before the agent options; agent options win.

DIFF RECORDS:
  <tmp>/njvm<pid>/<seq> appear atomically, one per recorded event:
  plugin, class, old length, new length (one per line), then the raw
  original bytes followed by the raw transformed bytes.
"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activate(base: Option<&str>, explicit: Option<&str>) -> Parsed {
        match parse(base, explicit) {
            Directive::Activate(parsed) => parsed,
            Directive::Help => panic!("unexpected help"),
        }
    }

    #[test]
    fn empty_input_yields_defaults() {
        let parsed = activate(None, None);
        assert_eq!(parsed.options, Options::default());
        assert_eq!(parsed.options.verbosity, Verbosity::Normal);
        assert!(parsed.issues.is_empty());
    }

    #[test]
    fn documented_example_parses() {
        let parsed = activate(None, Some("log=verbose,skip=beta,always=true"));
        assert_eq!(parsed.options.verbosity, Verbosity::Verbose);
        assert!(parsed.options.always_emit);
        assert!(parsed.options.skip.contains("beta"));
        assert_eq!(parsed.options.skip.iter().count(), 1);
        assert!(parsed.issues.is_empty());
    }

    #[test]
    fn numeric_aliases_are_accepted() {
        let parsed = activate(None, Some("log=0,always=1"));
        assert_eq!(parsed.options.verbosity, Verbosity::Silent);
        assert!(parsed.options.always_emit);

        let parsed = activate(None, Some("log=2,always=0"));
        assert_eq!(parsed.options.verbosity, Verbosity::Verbose);
        assert!(!parsed.options.always_emit);
    }

    #[test]
    fn explicit_options_override_environment() {
        let parsed = activate(Some("log=verbose,always=1,skip=alpha"), Some("log=silent,skip=beta"));
        assert_eq!(parsed.options.verbosity, Verbosity::Silent);
        assert!(parsed.options.always_emit);
        let skipped: Vec<&str> = parsed.options.skip.iter().collect();
        assert_eq!(skipped, vec!["alpha", "beta"]);
    }

    #[test]
    fn help_short_circuits_everything() {
        assert_eq!(parse(None, Some("log=bogus,help,always=true")), Directive::Help);
        assert_eq!(parse(Some("help"), Some("log=verbose")), Directive::Help);
    }

    #[test]
    fn malformed_tokens_keep_defaults() {
        let parsed = activate(None, Some("log=loud,always=maybe,colour=red,verbose"));
        assert_eq!(parsed.options, Options::default());
        assert_eq!(
            parsed.issues,
            vec![
                ConfigIssue::InvalidLogLevel {
                    value: "loud".to_string()
                },
                ConfigIssue::InvalidAlways {
                    value: "maybe".to_string()
                },
                ConfigIssue::UnknownKey {
                    key: "colour".to_string()
                },
                ConfigIssue::MissingValue {
                    token: "verbose".to_string()
                },
            ]
        );
    }

    #[test]
    fn keys_are_case_sensitive() {
        let parsed = activate(None, Some("LOG=verbose"));
        assert_eq!(parsed.options.verbosity, Verbosity::Normal);
        assert_eq!(
            parsed.issues,
            vec![ConfigIssue::UnknownKey {
                key: "LOG".to_string()
            }]
        );
    }

    #[test]
    fn blanks_and_empty_tokens_are_ignored() {
        let parsed = activate(None, Some(" log=verbose,,\tskip=gamma,"));
        assert_eq!(parsed.options.verbosity, Verbosity::Verbose);
        assert!(parsed.options.skip.contains("gamma"));
        assert!(parsed.issues.is_empty());
    }

    #[test]
    fn skip_list_is_bounded() {
        let input = (0..MAX_SKIP + 2)
            .map(|i| format!("skip=p{i}"))
            .collect::<Vec<_>>()
            .join(",");
        let parsed = activate(None, Some(&input));
        assert_eq!(parsed.options.skip.iter().count(), MAX_SKIP);
        assert_eq!(parsed.issues.len(), 2);
        assert!(matches!(
            &parsed.issues[0],
            ConfigIssue::SkipCapacity { name } if name == &format!("p{MAX_SKIP}")
        ));
    }

    #[test]
    fn repeated_skip_names_are_stored_once() {
        let parsed = activate(Some("skip=alpha"), Some("skip=alpha"));
        assert_eq!(parsed.options.skip.iter().count(), 1);
    }

    #[test]
    fn long_names_truncate_on_char_boundary() {
        let long = "é".repeat(200);
        let truncated = truncate_name(&long);
        assert!(truncated.len() <= MAX_NAME_LEN);
        assert!(long.starts_with(truncated));
    }

    #[test]
    fn usage_mentions_every_option() {
        let text = usage();
        for needle in ["help", "log=", "always=", "skip=", ENV_OPTIONS] {
            assert!(text.contains(needle), "usage is missing {needle}");
        }
    }
}
