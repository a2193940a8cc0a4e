use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::PlaybackSpeed;

// Build version with target info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Raster: cpu f32 premultiplied\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Stroke-by-stroke drawing replay
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable logging to file (default: inkplay.log in the data dir)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE", global = true)]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR", global = true)]
    pub config_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render the finished drawing to a PNG
    Render {
        /// Drawing document (JSON)
        #[arg(value_name = "DOC")]
        document: PathBuf,

        /// Output PNG
        #[arg(short = 'o', long = "output", value_name = "PNG", default_value = "out.png")]
        output: PathBuf,
    },

    /// Replay the drawing and write one PNG per observed frame
    Play {
        #[arg(value_name = "DOC")]
        document: PathBuf,

        /// Replay speed (default: from settings)
        #[arg(short = 's', long = "speed", value_enum)]
        speed: Option<SpeedArg>,

        /// Directory for frame_NNNNN.png files
        #[arg(short = 'd', long = "out-dir", value_name = "DIR", default_value = "frames")]
        out_dir: PathBuf,
    },

    /// Print elements in replay order
    Order {
        #[arg(value_name = "DOC")]
        document: PathBuf,
    },

    /// Write a sample drawing
    Demo {
        #[arg(value_name = "OUT", default_value = "demo.json")]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SpeedArg {
    Slow,
    Normal,
    Fast,
}

impl From<SpeedArg> for PlaybackSpeed {
    fn from(arg: SpeedArg) -> Self {
        match arg {
            SpeedArg::Slow => PlaybackSpeed::Slow,
            SpeedArg::Normal => PlaybackSpeed::Normal,
            SpeedArg::Fast => PlaybackSpeed::Fast,
        }
    }
}
