use anyhow::{Context, Result, bail};
use avpull::config::{app_name, app_version};
use avpull::{AudioDecodeSession, DecoderConfig, VideoReader};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use std::path::PathBuf;
use std::process;

fn cli() -> Command {
    Command::new(app_name())
        .version(app_version())
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("JSON decoder configuration.")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .subcommand(
            Command::new("audio")
                .about("Decode the best audio stream into a raw sample file.")
                .arg(
                    Arg::new("input")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("output")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print the stream description as JSON.")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("video")
                .about("Read frames from the best video stream.")
                .arg(
                    Arg::new("input")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("seek")
                        .long("seek")
                        .value_name("TICKS")
                        .help("Seek to this timestamp (stream time base) before reading.")
                        .value_parser(value_parser!(i64)),
                )
                .arg(
                    Arg::new("frames")
                        .short('n')
                        .long("frames")
                        .value_name("N")
                        .help("Stop after N frames.")
                        .value_parser(value_parser!(u64)),
                )
                .arg(
                    Arg::new("dump")
                        .long("dump")
                        .value_name("FILE")
                        .help("Write the last frame buffer to FILE.")
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
}

fn load_config(matches: &ArgMatches) -> Result<DecoderConfig> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => DecoderConfig::from_json_file(path),
        None => Ok(DecoderConfig::default()),
    }
}

fn run_audio(matches: &ArgMatches, config: DecoderConfig) -> Result<()> {
    let (Some(input), Some(output)) = (
        matches.get_one::<PathBuf>("input"),
        matches.get_one::<PathBuf>("output"),
    ) else {
        bail!("audio needs an input and an output path");
    };

    let mut session = AudioDecodeSession::new(config);
    let meta = session
        .run(input, output)
        .with_context(|| format!("decoding audio from {}", input.display()))?;

    if matches.get_flag("json") {
        let mut description = serde_json::to_value(meta)?;
        description["stats"] = serde_json::json!({
            "samples_decoded": session.stats().samples_decoded,
            "bytes_written": session.stats().bytes_written,
        });
        println!("{}", serde_json::to_string_pretty(&description)?);
    } else {
        println!(
            "{}: {} Hz, {} channel(s), {}",
            output.display(),
            meta.sample_rate,
            meta.channels,
            meta.format
        );
        println!("{}", meta.ffplay_command(output));
    }
    Ok(())
}

fn run_video(matches: &ArgMatches, config: DecoderConfig) -> Result<()> {
    let Some(input) = matches.get_one::<PathBuf>("input") else {
        bail!("video needs an input path");
    };
    let limit = matches.get_one::<u64>("frames").copied();

    let mut reader = VideoReader::with_config(input, config)
        .with_context(|| format!("opening video from {}", input.display()))?;
    println!(
        "{}: {}x{}, time base {}/{}",
        input.display(),
        reader.width(),
        reader.height(),
        reader.time_base().num(),
        reader.time_base().den()
    );

    if let Some(&ticks) = matches.get_one::<i64>("seek") {
        reader
            .try_seek(ticks)
            .with_context(|| format!("seeking to {}", ticks))?;
    }

    let mut frames = 0u64;
    while limit.is_none_or(|limit| frames < limit) && reader.try_read_next_frame()? {
        frames += 1;
        log::debug!("frame {} pts {} ({:.3}s)", frames, reader.pts(), reader.pts_seconds());
    }
    println!("read {} frame(s), last pts {} ({:.3}s)", frames, reader.pts(), reader.pts_seconds());

    if let Some(path) = matches.get_one::<PathBuf>("dump") {
        std::fs::write(path, reader.frame())
            .with_context(|| format!("writing {}", path.display()))?;
        println!(
            "wrote {} bytes ({} {}x{})",
            reader.frame().len(),
            reader.config().output_layout.pixel_format_name(),
            reader.width(),
            reader.height()
        );
    }

    reader.close();
    Ok(())
}

fn run(matches: &ArgMatches) -> Result<()> {
    let config = load_config(matches)?;

    match matches.subcommand() {
        Some(("audio", sub)) => run_audio(sub, config),
        Some(("video", sub)) => run_video(sub, config),
        _ => bail!("unknown command"),
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let matches = cli().get_matches();

    if let Err(err) = run(&matches) {
        eprintln!("{}: {:#}", app_name(), err);
        process::exit(1);
    }
}
