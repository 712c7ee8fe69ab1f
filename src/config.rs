use std::path::PathBuf;

/// Leading tokens contributed by the program's own invocation (`argv[0]`).
const INVOCATION_TOKENS: usize = 1;

pub const DEFAULT_APP_PATH: &str = "app.elf";
pub const DEFAULT_MODEL: &str = "nanosp";
pub const DEFAULT_API_PORT: &str = "8080";

/// Resolved launcher configuration.
///
/// All three values are optional positional CLI arguments with defaults. None
/// of them is validated here: an unknown device model or a malformed port
/// token surfaces from the emulator runtime, not from the launcher.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_path: PathBuf,
    pub model: String,
    pub api_port: String,
}

impl Config {
    /// Resolves the configuration from the full invocation token list,
    /// `argv[0]` included.
    pub fn from_invocation(argv: &[String]) -> Self {
        Self {
            app_path: PathBuf::from(arg_or_default(argv, 0, DEFAULT_APP_PATH)),
            model: arg_or_default(argv, 1, DEFAULT_MODEL),
            api_port: arg_or_default(argv, 2, DEFAULT_API_PORT),
        }
    }
}

/// Returns the positional argument `idx` steps past the invocation tokens,
/// or `default` when the list is too short.
///
/// `idx` is a skip count, not an index into a pre-parsed argument array: each
/// call independently slices the full token list at `INVOCATION_TOKENS + idx`
/// and takes the head of whatever remains. Missing arguments are not an
/// error; the default fills in silently.
pub fn arg_or_default(argv: &[String], idx: usize, default: &str) -> String {
    let rest = &argv[argv.len().min(INVOCATION_TOKENS + idx)..];
    match rest.first() {
        Some(value) => value.clone(),
        None => default.to_string(),
    }
}

/// Parses an API port token. `None` is the not-a-number sentinel: the raw
/// token still travels to the container runtime unparsed, this result only
/// gates the local readiness poll.
pub fn parse_api_port(raw: &str) -> Option<u16> {
    raw.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::{arg_or_default, parse_api_port, Config};

    fn argv(tail: &[&str]) -> Vec<String> {
        std::iter::once("speculos-launch")
            .chain(tail.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn defaults_apply_when_no_arguments_are_supplied() {
        let cfg = Config::from_invocation(&argv(&[]));
        assert_eq!(cfg.app_path.to_str(), Some("app.elf"));
        assert_eq!(cfg.model, "nanosp");
        assert_eq!(cfg.api_port, "8080");
    }

    #[test]
    fn supplied_arguments_override_defaults_positionally() {
        let cfg = Config::from_invocation(&argv(&["mybin.elf", "nanox", "9000"]));
        assert_eq!(cfg.app_path.to_str(), Some("mybin.elf"));
        assert_eq!(cfg.model, "nanox");
        assert_eq!(cfg.api_port, "9000");
        assert_eq!(parse_api_port(&cfg.api_port), Some(9000));
    }

    #[test]
    fn partial_argument_lists_fall_back_per_position() {
        let cfg = Config::from_invocation(&argv(&["mybin.elf"]));
        assert_eq!(cfg.app_path.to_str(), Some("mybin.elf"));
        assert_eq!(cfg.model, "nanosp");
        assert_eq!(cfg.api_port, "8080");
    }

    #[test]
    fn each_resolution_slices_the_full_token_list_independently() {
        let tokens = argv(&["a", "b", "c"]);
        assert_eq!(arg_or_default(&tokens, 0, "x"), "a");
        assert_eq!(arg_or_default(&tokens, 1, "x"), "b");
        assert_eq!(arg_or_default(&tokens, 2, "x"), "c");
        assert_eq!(arg_or_default(&tokens, 3, "x"), "x");
    }

    #[test]
    fn non_numeric_port_parses_to_the_sentinel() {
        let cfg = Config::from_invocation(&argv(&["app.elf", "nanosp", "abc"]));
        assert_eq!(parse_api_port(&cfg.api_port), None);
        // The raw token is preserved for the container runtime to reject.
        assert_eq!(cfg.api_port, "abc");
    }
}
