#![forbid(unsafe_code)]

//! Command-line launcher for a hardware-wallet application emulator.
//!
//! Starts a Speculos container for one application binary, seeds it with a
//! fixed test mnemonic, and keeps the process alive until interrupted. All
//! emulation heavy lifting (image management, device simulation, the control
//! API) is delegated to the container; see [`emu`].

mod config;
pub mod emu;

pub use config::{arg_or_default, parse_api_port, Config};
pub use emu::{ensure_image_available, stop_all_sessions, Session, StartOptions};

/// Deterministic wallet-recovery material for the emulated device. A fixed,
/// publicly known test mnemonic, never production key material.
pub const APP_SEED: &str =
    "equip will roof matter pink blind book anxiety banner elbow sun young";

/// Start configuration for a launcher-managed session: service defaults with
/// the device model applied, logging forced on, and the test seed injected
/// through Speculos' extra startup arguments.
pub fn launch_options(model: &str) -> StartOptions {
    StartOptions {
        model: model.to_string(),
        logging: true,
        custom: format!("-s \"{APP_SEED}\""),
        ..StartOptions::default()
    }
}

#[cfg(test)]
mod tests {
    use super::{launch_options, APP_SEED};

    #[test]
    fn logging_is_always_forced_on() {
        for model in ["nanos", "nanosp", "nanox", "not-a-model"] {
            assert!(launch_options(model).logging);
        }
    }

    #[test]
    fn custom_arguments_embed_the_fixed_seed_exactly() {
        let expected =
            "-s \"equip will roof matter pink blind book anxiety banner elbow sun young\"";
        assert_eq!(launch_options("nanosp").custom, expected);
        // Input-independent: the seed flag never varies with the model.
        assert_eq!(launch_options("nanox").custom, expected);
        assert_eq!(launch_options("nanosp").custom, format!("-s \"{APP_SEED}\""));
    }

    #[test]
    fn model_override_rides_on_service_defaults() {
        let opts = launch_options("nanox");
        assert_eq!(opts.model, "nanox");
        // Untouched defaults survive the merge.
        assert_eq!(opts.start_timeout, super::StartOptions::default().start_timeout);
    }
}
