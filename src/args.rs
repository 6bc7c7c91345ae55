use adb_vision_calibrate::adb::BackendKind;
use std::env;
use std::path::PathBuf;

/// Exit status for command line usage errors (sysexits `EX_USAGE`).
pub const USAGE_EXIT: u8 = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Screenshot,
    Match { label: String, all: bool },
    Tap(String),
    Scale,
    Calibrate,
    VerifyDirection,
}

#[derive(Debug, PartialEq)]
pub struct Args {
    pub mode: Mode,
    pub config: Option<PathBuf>,
    /// Offline frame source instead of the device
    pub image: Option<PathBuf>,
    /// Overrides `[device] backend` from the config file
    pub backend: Option<BackendKind>,
    pub debug_mode: bool,
}

impl Args {
    /// Parse the process arguments. `Err` carries the exit status when the
    /// program should stop here: 0 after help or version, [`USAGE_EXIT`]
    /// after a usage error that has already been reported.
    pub fn parse() -> Result<Self, u8> {
        Self::settle(Self::parse_from(env::args().skip(1)))
    }

    fn settle(parsed: Result<Option<Self>, String>) -> Result<Self, u8> {
        match parsed {
            Ok(Some(args)) => Ok(args),
            Ok(None) => Err(0),
            Err(message) => {
                eprintln!("❌ {}", message);
                print_help();
                Err(USAGE_EXIT)
            }
        }
    }

    pub fn parse_from<I>(args: I) -> Result<Option<Self>, String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut mode: Option<Mode> = None;
        let mut all = false;
        let mut config = None;
        let mut image = None;
        let mut backend = None;
        let mut debug_mode = false;

        let mut set_mode = |m: Mode| -> Result<(), String> {
            if let Some(existing) = &mode {
                return Err(format!("Conflicting modes: {:?} and {:?}", existing, m));
            }
            mode = Some(m);
            Ok(())
        };

        for arg in args {
            if arg == "--help" || arg == "-h" {
                print_help();
                return Ok(None);
            } else if arg == "--version" || arg == "-v" {
                println!(
                    "ADB Vision Calibrate v{} (built {})",
                    env!("APP_VERSION_DISPLAY"),
                    env!("APP_BUILD_YEAR")
                );
                return Ok(None);
            } else if arg == "--debug" {
                debug_mode = true;
            } else if arg == "--all" {
                all = true;
            } else if arg == "--screenshot" || arg == "-s" {
                set_mode(Mode::Screenshot)?;
            } else if arg == "--scale" {
                set_mode(Mode::Scale)?;
            } else if arg == "--calibrate" {
                set_mode(Mode::Calibrate)?;
            } else if arg == "--verify-direction" {
                set_mode(Mode::VerifyDirection)?;
            } else if let Some(label) = arg.strip_prefix("--match=") {
                set_mode(Mode::Match {
                    label: non_empty("--match", label)?,
                    all: false,
                })?;
            } else if let Some(label) = arg.strip_prefix("--tap=") {
                set_mode(Mode::Tap(non_empty("--tap", label)?))?;
            } else if let Some(path) = arg.strip_prefix("--config=") {
                config = Some(PathBuf::from(non_empty("--config", path)?));
            } else if let Some(path) = arg.strip_prefix("--image=") {
                image = Some(PathBuf::from(non_empty("--image", path)?));
            } else if let Some(kind) = arg.strip_prefix("--impl=") {
                backend = Some(kind.parse::<BackendKind>()?);
            } else {
                return Err(format!("Unknown argument: {}", arg));
            }
        }

        let mut mode = mode.ok_or_else(|| "No mode given".to_string())?;
        if let Mode::Match { all: ref mut a, .. } = mode {
            *a = all;
        } else if all {
            return Err("--all only applies to --match".to_string());
        }
        if image.is_some() && !matches!(mode, Mode::Match { .. } | Mode::Scale) {
            return Err("--image only applies to --match and --scale".to_string());
        }

        Ok(Some(Args {
            mode,
            config,
            image,
            backend,
            debug_mode,
        }))
    }
}

fn non_empty(flag: &str, value: &str) -> Result<String, String> {
    if value.is_empty() {
        Err(format!("{} needs a value", flag))
    } else {
        Ok(value.to_string())
    }
}

fn print_help() {
    println!("🎯 ADB Vision Calibrate");
    println!();
    println!("USAGE:");
    println!("    adb-vision-calibrate <MODE> [OPTIONS]");
    println!();
    println!("MODES:");
    println!("    --screenshot, -s      Save a device screenshot to cli-screenshot.png");
    println!("    --match=<label>       Find a template in the current frame");
    println!("    --tap=<label>         Find a template on the device and tap its centre");
    println!("    --scale               Estimate the current zoom scale");
    println!("    --calibrate           Zoom until the measured scale reaches the target");
    println!("    --verify-direction    Issue one zoom step and check the direction mapping");
    println!();
    println!("OPTIONS:");
    println!("    --config=<path>       Config file (default: ./adb-vision.toml if present)");
    println!("    --image=<png>         Use a saved screenshot instead of the device");
    println!("    --all                 With --match, report every separated match");
    println!("    --impl=<shell|rust>   ADB implementation (default from config: rust)");
    println!("                          The shell implementation requires the adb tool.");
    println!("    --debug               Enable debug logging");
    println!("    --help, -h            Show this help message");
    println!("    --version, -v         Show version information");
    println!();
    println!("EXAMPLES:");
    println!("    adb-vision-calibrate --match=claim_button --image=shot.png --all");
    println!("    adb-vision-calibrate --calibrate --impl=shell --debug");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Option<Args>, String> {
        Args::parse_from(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_match_with_options() {
        let args = parse(&["--match=castle", "--all", "--image=shot.png", "--impl=shell"])
            .unwrap()
            .unwrap();
        assert_eq!(
            args.mode,
            Mode::Match {
                label: "castle".to_string(),
                all: true
            }
        );
        assert_eq!(args.image, Some(PathBuf::from("shot.png")));
        assert_eq!(args.backend, Some(BackendKind::Shell));
        assert!(!args.debug_mode);
    }

    #[test]
    fn test_calibrate_with_config() {
        let args = parse(&["--debug", "--calibrate", "--config=game.toml"])
            .unwrap()
            .unwrap();
        assert_eq!(args.mode, Mode::Calibrate);
        assert_eq!(args.config, Some(PathBuf::from("game.toml")));
        assert!(args.debug_mode);
        assert_eq!(args.backend, None);
    }

    #[test]
    fn test_usage_errors() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["--bogus"]).is_err());
        assert!(parse(&["--scale", "--calibrate"]).is_err());
        assert!(parse(&["--tap="]).is_err());
        assert!(parse(&["--scale", "--impl=java"]).is_err());
        assert!(parse(&["--scale", "--all"]).is_err());
        assert!(parse(&["--calibrate", "--image=a.png"]).is_err());
    }

    #[test]
    fn test_help_exits_quietly() {
        assert_eq!(parse(&["--help"]), Ok(None));
        assert_eq!(Args::settle(parse(&["--help"])), Err(0));
    }

    #[test]
    fn test_usage_error_exit_status() {
        assert_eq!(Args::settle(parse(&["--bogus"])), Err(USAGE_EXIT));
        assert_eq!(Args::settle(parse(&[])), Err(USAGE_EXIT));
        let args = Args::settle(parse(&["--scale"])).unwrap();
        assert_eq!(args.mode, Mode::Scale);
    }
}
