use anyhow::Result;
use clap::{Parser, Subcommand};
use itchcraft::devices::{DeviceMetadata, find_bite_healers};
use itchcraft::prefs::{Duration, Generation, Preferences, SkinSensitivity};
use itchcraft::start::start_with_preferences;
use log::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "itchcraft", version, about)]
struct Opt {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show a list of USB bite healers that are connected to the host
    Info,

    /// Activate (i.e. heat up) a connected USB bite healer for demonstration purposes
    Start {
        /// One of `short`, `medium`, or `long`
        #[arg(long, default_value = "short")]
        duration: Duration,

        /// `child` or `adult`
        #[arg(long, default_value = "child")]
        generation: Generation,

        /// `regular` or `sensitive`
        #[arg(long, default_value = "sensitive")]
        skin_sensitivity: SkinSensitivity,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::new()
            .filter_or("ITCHCRAFT_LOG", "info")
            .write_style("ITCHCRAFT_LOG_STYLE"),
    )
    .init();

    match Opt::parse().command {
        Command::Info => info()?,
        Command::Start {
            duration,
            generation,
            skin_sensitivity,
        } => {
            warn!("This app is only a tech demo");
            warn!("and NOT for medical use.");
            warn!("The app is NOT SAFE to use");
            warn!("for treating insect bites.");

            start_with_preferences(&Preferences {
                duration,
                generation,
                skin_sensitivity,
            })?;
        }
    };

    Ok(())
}

fn info() -> Result<()> {
    let bite_healers: Vec<DeviceMetadata> = find_bite_healers()?.collect();
    if bite_healers.is_empty() {
        info!("No known bite healers detected");
        return Ok(());
    }

    let n = bite_healers.len();
    info!("Detected {n} bite healer{}", if n == 1 { "" } else { "s" });

    for device in &bite_healers {
        let statement = device.description().statement;
        let support_status = if device.is_supported() {
            "supported"
        } else {
            "NOT supported"
        };

        println!(
            "{} [{}, {}]",
            device.description(),
            statement,
            support_status,
        );
        for line in statement.comment.into_iter().flat_map(str::lines) {
            println!("    {}", line.trim());
        }
    }

    Ok(())
}
