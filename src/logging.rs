use dirs;
use fern;
use log::{Level, LevelFilter};
use std::io;

/// Initializes logging with the fern logger (grounded on the teacher's
/// own `src/logging.rs`): terminal + `/tmp/dconv.log` + a home-relative
/// log, with an optional callback for a UI front end to mirror records
/// into its own display.
pub fn log<F: Fn(Level, &str) + Send + Sync + 'static>(callback: F) -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .level(LevelFilter::Off)
        .level_for("dconv", LevelFilter::Debug)
        .level_for("dconv_backend", LevelFilter::Debug)
        .level_for("dconv_engine", LevelFilter::Debug)
        .level_for("dconv_journal", LevelFilter::Debug)
        .level_for("dconv_external", LevelFilter::Debug)
        .chain(fern::Output::call(move |record| callback(record.level(), &format!("{}", record.args()))))
        .chain({
            let mut logger = fern::Dispatch::new()
                .format(|out, message, record| {
                    out.finish(format_args!(
                        "[{}] {}: {}",
                        record.level(),
                        {
                            let target = record.target();
                            target.find(':').map_or(target, |pos| &target[..pos])
                        },
                        message
                    ))
                })
                .chain(io::stderr());

            match fern::log_file("/tmp/dconv.log") {
                Ok(log) => logger = logger.chain(log),
                Err(why) => eprintln!("failed to create log file at /tmp/dconv.log: {}", why),
            };

            if let Some(home) = dirs::home_dir() {
                let dir = home.join(".dconv");
                let _ = std::fs::create_dir_all(&dir);
                match fern::log_file(&dir.join("dconv.log")) {
                    Ok(log) => logger = logger.chain(log),
                    Err(why) => eprintln!("failed to set up logging under the home directory: {}", why),
                }
            }

            logger
        })
        .apply()?;

    Ok(())
}
