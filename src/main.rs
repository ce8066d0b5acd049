extern crate cinch;
extern crate clap;
#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate log;
extern crate simplelog;
extern crate unicorn_engine;

pub mod error {
    error_chain! {
        types {
            Error, ErrorKind, ResultExt, Result;
        }

        foreign_links {
            Cinch(::cinch::error::Error);
            IoError(::std::io::Error);
        }
    }
}


use cinch::{ArchType, Architecture, Endian};
use error::*;
use std::fs;
use unicorn_engine::unicorn_const::Permission;


const PAGE_SIZE: u64 = 0x1000;
const STACK_SIZE: u64 = 0x10000;


fn parse_address(name: &str, text: &str) -> Result<u64> {
    let parsed = if text.starts_with("0x") || text.starts_with("0X") {
        u64::from_str_radix(&text[2..], 16)
    } else {
        text.parse::<u64>()
    };
    parsed.chain_err(|| format!("Invalid {} \"{}\"", name, text))
}


fn page_range(begin: u64, end: u64) -> Result<(u64, usize)> {
    let begin = begin & !(PAGE_SIZE - 1);
    let end = match end.checked_add(PAGE_SIZE - 1) {
        Some(end) => end & !(PAGE_SIZE - 1),
        None => bail!("Range 0x{:x}-0x{:x} runs past the end of memory", begin, end),
    };
    Ok((begin, (end - begin) as usize))
}


fn run() -> Result<()> {
    let matches = clap::App::new("cinch")
        .version("0.1.0")
        .about("Run a raw firmware image under Unicorn")
        .arg(clap::Arg::with_name("arch")
            .short("a")
            .long("arch")
            .value_name("ARCH")
            .help("Architecture: mips32, mips, arm64, aarch64")
            .required(true))
        .arg(clap::Arg::with_name("endian")
            .short("e")
            .long("endian")
            .value_name("ENDIAN")
            .help("Byte order: big or little")
            .default_value("little"))
        .arg(clap::Arg::with_name("filename")
            .short("f")
            .value_name("FILE")
            .help("Raw image to load")
            .required(true))
        .arg(clap::Arg::with_name("base")
            .short("b")
            .value_name("BASE")
            .help("Address the image is loaded at")
            .default_value("0x10000"))
        .arg(clap::Arg::with_name("begin")
            .long("begin")
            .value_name("ADDRESS")
            .help("Address to start at, the base by default"))
        .arg(clap::Arg::with_name("until")
            .long("until")
            .value_name("ADDRESS")
            .help("Address to stop at, the end of the image by default"))
        .arg(clap::Arg::with_name("stack")
            .long("stack")
            .value_name("ADDRESS")
            .help("Initial stack pointer")
            .default_value("0x7fff0000"))
        .arg(clap::Arg::with_name("log")
            .short("l")
            .long("log")
            .value_name("LOG_LEVEL")
            .help("Log level"))
        .get_matches();

    if let Some(log_level) = matches.value_of("log") {
        let level_filter = match log_level {
            "trace" => simplelog::LevelFilter::Trace,
            "debug" => simplelog::LevelFilter::Debug,
            "info" => simplelog::LevelFilter::Info,
            "warn" => simplelog::LevelFilter::Warn,
            _ => simplelog::LevelFilter::Error,
        };
        if let Err(err) = simplelog::TermLogger::init(
            level_filter,
            simplelog::Config::default(),
            simplelog::TerminalMode::Stderr,
            simplelog::ColorChoice::Auto,
        ) {
            eprintln!("failed to initialize logging: {}", err);
        }
    }

    // clap enforces the required and defaulted arguments.
    let arch_type = matches.value_of("arch").unwrap_or_default().parse::<ArchType>()?;
    let endian = matches.value_of("endian").unwrap_or_default().parse::<Endian>()?;
    let filename = matches.value_of("filename").unwrap_or_default();
    let base = parse_address("base", matches.value_of("base").unwrap_or_default())?;
    let stack = parse_address("stack", matches.value_of("stack").unwrap_or_default())?;

    let image = fs::read(filename).chain_err(|| format!("Could not read {}", filename))?;
    let end = match base.checked_add(image.len() as u64) {
        Some(end) => end,
        None => bail!("{} does not fit at 0x{:x}", filename, base),
    };

    let begin = match matches.value_of("begin") {
        Some(begin) => parse_address("begin", begin)?,
        None => base,
    };
    let until = match matches.value_of("until") {
        Some(until) => parse_address("until", until)?,
        None => end,
    };

    let mut adapter = Architecture::new(arch_type, endian)?;
    info!("{:?}", adapter);

    {
        let mut cpu = adapter.cpu()?;

        let (address, size) = page_range(base, end)?;
        cpu.mem_map(address, size, Permission::ALL)?;
        cpu.mem_write(base, &image)?;

        let (address, size) = page_range(stack.saturating_sub(STACK_SIZE), stack)?;
        cpu.mem_map(address, size, Permission::READ | Permission::WRITE)?;
        cpu.set_sp(stack)?;
    }

    if let ArchType::Arm64 = arch_type {
        adapter.enable_vfp()?;
    }
    adapter.hook_mem_invalid(cinch::hooks::log_invalid_access)?;

    let result = adapter.run(begin, until, 0, 0);

    for (name, value) in adapter.registers()?.dump()? {
        println!("{:>12} 0x{:x}", name, value);
    }

    Ok(result?)
}




fn main() {
    match run() {
        Ok(_) => {}
        Err(e) => {
            eprintln!("error: {}", e);
            for e in e.iter().skip(1) {
                eprintln!("caused by: {}", e);
            }
            if let Some(backtrace) = e.backtrace() {
                eprintln!("backtrace: {:?}", backtrace);
            }
        }
    }
}
