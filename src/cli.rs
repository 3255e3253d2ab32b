use clap::Parser;
use gfonts_dl::DEFAULT_SUBSET;
use std::fmt;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gfonts-dl")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Google Fonts API key (falls back to the saved one)
    #[arg(short = 'k', long, env = "GOOGLE_FONTS_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Output directory (falls back to the saved one)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Character subset a family must support
    #[arg(short, long, default_value = DEFAULT_SUBSET)]
    pub subset: String,

    /// Settings file
    #[arg(short, long, default_value = "gfonts-dl.toml")]
    pub config: PathBuf,

    /// Remember the API key and output directory before downloading
    #[arg(long)]
    pub save_config: bool,

    /// HTTP proxy (e.g., http://127.0.0.1:7890)
    #[arg(long)]
    pub proxy: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value = "300")]
    pub timeout: u64,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only print errors and the final summary
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("output", &self.output)
            .field("subset", &self.subset)
            .field("config", &self.config)
            .field("save_config", &self.save_config)
            .field("proxy", &self.proxy)
            .field("timeout", &self.timeout)
            .field("verbose", &self.verbose)
            .field("quiet", &self.quiet)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["gfonts-dl"]).unwrap();
        assert_eq!(args.subset, "hebrew");
        assert_eq!(args.config, PathBuf::from("gfonts-dl.toml"));
        assert_eq!(args.timeout, 300);
        assert!(args.output.is_none());
        assert!(!args.save_config);
    }

    #[test]
    fn explicit_values() {
        let args = Args::try_parse_from([
            "gfonts-dl",
            "-k",
            "abc",
            "-o",
            "fonts",
            "--subset",
            "arabic",
            "--save-config",
            "-vv",
        ])
        .unwrap();
        assert_eq!(args.api_key.as_deref(), Some("abc"));
        assert_eq!(args.output, Some(PathBuf::from("fonts")));
        assert_eq!(args.subset, "arabic");
        assert!(args.save_config);
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Args::try_parse_from(["gfonts-dl", "-q", "-v"]).is_err());
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let args = Args::try_parse_from(["gfonts-dl", "-k", "SECRET-KEY-123", "-o", "fonts"]).unwrap();
        let rendered = format!("{:?}", args);
        assert!(!rendered.contains("SECRET-KEY-123"), "{}", rendered);
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("fonts"));
    }
}
