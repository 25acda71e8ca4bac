use clap::{Arg, ArgAction, ArgMatches, Command, value_parser, ValueEnum};
use log::{info, LevelFilter};
use micronova_storage::geometry::{self, Geometry, FLOPPY_TYPES, FUNCTION_READ,
                                  HARD_DISK_TYPES, WORDS_PER_SECTOR};
use micronova_storage::{floppy_command, specify_command, status, DriveControl, FileStore,
                        FloppyController, HardDiskController, IoDevice, IoOp, Memory, Pulse,
                        Time};
use micronova_utils::octdump::pretty_print_octal_words;
use std::fs;
use std::path::Path;
use std::sync::mpsc;

const IMAGE_PATH: &str = "IMAGE_PATH";
const DRIVE_TYPE: &str = "drive-type";
const FLOPPY: &str = "floppy";
const CYLINDER: &str = "cylinder";
const SURFACE: &str = "surface";
const SECTOR: &str = "sector";
const COUNT: &str = "count";
const LOG_PATH: &str = "LOG_PATH";
const LOG_LEVEL: &str = "LOG_LEVEL";

const DRIVE_TYPES: [&str; 3] = ["6095", "6097", "6038"];

const INTERRUPT_HARD_DISK: u32 = 0o33;
const INTERRUPT_FLOPPY: u32 = 0o20;

/// How long a single diskette command may take before we give up on it.
const FLOPPY_DEADLINE: Time = 100_000;

/// Possible log levels.
#[derive(Debug, PartialEq, Eq, Copy, Clone, ValueEnum)]
enum LogLevel {
    TRACE,
    DEBUG,
    INFO,
}

fn cli() -> Command {
    // Hack to make the build dirty when the toml changes.
    include_str!("../../Cargo.toml");

    let image = Arg::new(IMAGE_PATH)
        .help("The disk image file.")
        .action(ArgAction::Set)
        .required(true);
    let drive = Arg::new(DRIVE_TYPE)
        .help("The drive type the image belongs to.")
        .short('d')
        .long("drive")
        .action(ArgAction::Set)
        .required(true)
        .value_parser(DRIVE_TYPES);

    clap::command!()
        .max_term_width(100)
        .subcommand_required(true)
        .after_help("\
Images are flat files of 256-word sectors in cylinder, surface, sector order, \
with each word stored little-endian. Dumps go through the emulated \
controller, so they show exactly what a program on the machine would read.")
        .arg(Arg::new(LOG_PATH)
            .help("If set, a debug log will be written to the given path.")
            .short('l')
            .long("log")
            .action(ArgAction::Set)
            .global(true))
        .arg(Arg::new(LOG_LEVEL)
            .help("Set the log level. Has no effect without \
                   specifying --log as well. Case insensitive.")
            .short('L')
            .long("log-level")
            .action(ArgAction::Set)
            .default_value("trace")
            .value_parser(value_parser!(LogLevel))
            .ignore_case(true)
            .global(true))
        .subcommand(Command::new("info")
            .about("Work out the drive type of an image from its size.")
            .arg(image.clone())
            .arg(Arg::new(FLOPPY)
                .help("Match against diskette types instead of disk packs.")
                .long("floppy")
                .action(ArgAction::SetTrue)))
        .subcommand(Command::new("create")
            .about("Create a blank image for a drive type.")
            .arg(image.clone())
            .arg(drive.clone()))
        .subcommand(Command::new("dump")
            .about("Read sectors through the emulated controller and print them in octal.")
            .arg(image)
            .arg(drive)
            .arg(Arg::new(CYLINDER)
                .help("Cylinder (track, for diskettes) to read from.")
                .short('c')
                .long("cylinder")
                .action(ArgAction::Set)
                .required(true)
                .value_parser(value_parser!(u16)))
            .arg(Arg::new(SURFACE)
                .help("Surface to read from. Diskettes only have surface 0.")
                .short('s')
                .long("surface")
                .action(ArgAction::Set)
                .default_value("0")
                .value_parser(value_parser!(u16)))
            .arg(Arg::new(SECTOR)
                .help("First sector to read.")
                .short('S')
                .long("sector")
                .action(ArgAction::Set)
                .required(true)
                .value_parser(value_parser!(u16)))
            .arg(Arg::new(COUNT)
                .help("Number of sectors to read.")
                .short('n')
                .long("count")
                .action(ArgAction::Set)
                .default_value("1")
                .value_parser(value_parser!(u16).range(1..=16))))
}

/// Logging setup for normal build (not testing): a file log if asked for,
/// otherwise warnings and errors on the terminal.
#[cfg(not(test))]
fn init_logging(log_path: Option<&String>, level: LevelFilter) -> Result<(), String> {
    use simplelog::{ColorChoice, ConfigBuilder, LevelPadding, TerminalMode,
                    TermLogger, WriteLogger};
    use std::fs::File;

    let config = ConfigBuilder::new()
        .set_level_padding(LevelPadding::Right)
        .set_location_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .set_time_format_rfc3339()
        .build();

    match log_path {
        Some(path) => {
            let logfile = File::create(path)
                .map_err(|e| format!("Failed to create log file: {}", e))?;
            WriteLogger::init(level, config, logfile)
        }
        None => TermLogger::init(LevelFilter::Warn, config,
                                 TerminalMode::Stderr, ColorChoice::Auto),
    }.map_err(|e| format!("Failed to set up logging: {}", e))
}

/// Logging setup for testing build (ignores multiple invocations).
#[cfg(test)]
fn init_logging(_log_path: Option<&String>, level: LevelFilter) -> Result<(), String> {
    let _ = simplelog::TestLogger::init(level, simplelog::Config::default());
    Ok(())
}

/// Where a dump should read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Request {
    cylinder: u16,
    surface: u16,
    sector: u16,
    count: u16,
}

/// Look a drive type up in both catalogues. The flag is true for diskettes.
fn find_drive(name: &str) -> Option<(&'static Geometry, bool)> {
    geometry::find_type(HARD_DISK_TYPES, name)
        .map(|i| (&HARD_DISK_TYPES[i], false))
        .or_else(|| geometry::find_type(FLOPPY_TYPES, name).map(|i| (&FLOPPY_TYPES[i], true)))
}

fn describe(geometry: &Geometry, image_bytes: u64) -> String {
    format!("\
Drive type: {}
Cylinders:  {}
Surfaces:   {}
Sectors:    {}
Capacity:   {} bytes ({} sectors)
Image size: {} bytes
",
            geometry.name, geometry.cylinders, geometry.surfaces, geometry.sectors,
            geometry.capacity_bytes(), geometry.blocks(), image_bytes)
}

fn show_info(args: &ArgMatches) -> Result<(), String> {
    let path = args.get_one::<String>(IMAGE_PATH).unwrap();
    let bytes = fs::metadata(path)
        .map_err(|e| format!("Could not access '{}': {}", path, e))?
        .len();
    if bytes == 0 {
        return Err(format!("'{}' is empty, so could be any drive type.", path));
    }
    let floppy = args.get_flag(FLOPPY);
    let catalogue = if floppy {FLOPPY_TYPES} else {HARD_DISK_TYPES};
    let capacity = catalogue.iter().map(Geometry::capacity_bytes).max().unwrap_or(0);
    if bytes > capacity {
        return Err(micronova_storage::DiskError::ImageTooLarge { bytes, capacity }.to_string());
    }

    // Let the controller size the image the same way it would on attach.
    let (interrupt_tx, _interrupt_rx) = mpsc::channel();
    let geometry = if floppy {
        autosized_type(&mut FloppyController::new(interrupt_tx, INTERRUPT_FLOPPY), path)
    } else {
        autosized_type(&mut HardDiskController::new(interrupt_tx, INTERRUPT_HARD_DISK), path)
    }?;
    print!("{}", describe(geometry, bytes));
    Ok(())
}

/// Attach an image read-only to unit 0 with autosizing on, and report the
/// drive type it was given.
fn autosized_type(drive: &mut impl DriveControl,
                  path: &str) -> Result<&'static Geometry, String> {
    drive.set_write_lock(0, true).map_err(|e| e.to_string())?;
    drive.set_autosize(0, true).map_err(|e| e.to_string())?;
    drive.attach(0, Path::new(path))
        .map_err(|e| format!("Failed to attach '{}': {}", path, e))?;
    let geometry = drive.drive_type(0).map_err(|e| e.to_string())?;
    drive.detach(0).map_err(|e| e.to_string())?;
    Ok(geometry)
}

fn create_image(args: &ArgMatches) -> Result<(), String> {
    let path = args.get_one::<String>(IMAGE_PATH).unwrap();
    let name = args.get_one::<String>(DRIVE_TYPE).unwrap();
    let (geometry, _) = find_drive(name)
        .ok_or_else(|| format!("Unknown drive type '{}'.", name))?;
    if Path::new(path).exists() {
        return Err(format!("'{}' already exists.", path));
    }
    FileStore::create(path, geometry.capacity_bytes())
        .map_err(|e| format!("Failed to create '{}': {}", path, e))?;
    info!("Created a blank {} image at '{}'.", geometry.name, path);
    Ok(())
}

/// Read the requested sectors through the disk pack controller into memory
/// from address 0.
fn read_hard_disk(path: &Path, geometry: &Geometry, request: Request,
                  memory: &mut Memory) -> Result<(), String> {
    let (interrupt_tx, _interrupt_rx) = mpsc::channel();
    let mut disk = HardDiskController::new(interrupt_tx, INTERRUPT_HARD_DISK);
    disk.set_write_lock(0, true).map_err(|e| e.to_string())?;
    disk.set_drive_type(0, geometry.name).map_err(|e| e.to_string())?;
    disk.attach(0, path).map_err(|e| format!("Failed to attach '{}': {}", path.display(), e))?;

    let layout = geometry.layout;
    disk.io(Pulse::None, IoOp::Doc,
            layout.unit_word(0, request.surface, request.sector, request.count));
    disk.io(Pulse::None, IoOp::Dob, 0);
    disk.io(Pulse::Start, IoOp::Doa, layout.command_word(FUNCTION_READ, request.cylinder));
    disk.run_until_idle(memory).map_err(|e| format!("Read failed: {}", e))?;

    let status = disk.io(Pulse::None, IoOp::Dia, 0);
    if status & status::hard_disk::ERR != 0 {
        return Err(format!("The controller reported an error (status {:06o}).", status));
    }
    Ok(())
}

/// Read the requested sectors through the diskette controller into memory
/// from address 0, stepping out to the track first.
fn read_floppy(path: &Path, geometry: &Geometry, request: Request,
               memory: &mut Memory) -> Result<(), String> {
    let (interrupt_tx, _interrupt_rx) = mpsc::channel();
    let mut floppy = FloppyController::new(interrupt_tx, INTERRUPT_FLOPPY);
    floppy.set_write_lock(0, true).map_err(|e| e.to_string())?;
    floppy.set_drive_type(0, geometry.name).map_err(|e| e.to_string())?;
    floppy.attach(0, path).map_err(|e| format!("Failed to attach '{}': {}", path.display(), e))?;

    for _ in 0..request.cylinder {
        floppy_operation(&mut floppy, memory, specify_command(0, 0, floppy_command::STEP_IN))?;
    }
    floppy.io(Pulse::None, IoOp::Dob, 0);
    for sector in request.sector..request.sector + request.count {
        floppy_operation(&mut floppy, memory,
                         specify_command(0, sector, floppy_command::READ_NEXT))?;
    }
    return Ok(());

    fn floppy_operation(floppy: &mut FloppyController, memory: &mut Memory,
                        sc: u16) -> Result<(), String> {
        floppy.io(Pulse::Start, IoOp::Doa, sc);
        let deadline = floppy.now() + FLOPPY_DEADLINE;
        let done = floppy.run_until_done(deadline, memory)
            .map_err(|e| format!("Read failed: {}", e))?;
        if !done {
            return Err(format!("The controller never finished command {:06o}.", sc));
        }
        let status = floppy.io(Pulse::None, IoOp::Dia, 0);
        if status & status::floppy::ERROR != 0 {
            return Err(format!("The controller reported an error (status {:06o}).", status));
        }
        Ok(())
    }
}

fn dump_image(args: &ArgMatches) -> Result<(), String> {
    let path = args.get_one::<String>(IMAGE_PATH).unwrap();
    let name = args.get_one::<String>(DRIVE_TYPE).unwrap();
    let (geometry, is_floppy) = find_drive(name)
        .ok_or_else(|| format!("Unknown drive type '{}'.", name))?;
    let request = Request {
        cylinder: *args.get_one::<u16>(CYLINDER).unwrap(),
        surface: *args.get_one::<u16>(SURFACE).unwrap(),
        sector: *args.get_one::<u16>(SECTOR).unwrap(),
        count: *args.get_one::<u16>(COUNT).unwrap(),
    };
    if !geometry.contains(request.cylinder, request.surface, request.sector) {
        return Err(format!("C/H/S {}/{}/{} is not on a {}.", request.cylinder,
                           request.surface, request.sector, geometry.name));
    }
    if is_floppy && request.sector + request.count > geometry.sectors {
        return Err(format!("A {} track only has {} sectors.", geometry.name, geometry.sectors));
    }

    let mut memory = Memory::new();
    if is_floppy {
        read_floppy(Path::new(path), geometry, request, &mut memory)?;
    } else {
        read_hard_disk(Path::new(path), geometry, request, &mut memory)?;
    }
    info!("Read {} sectors from '{}'.", request.count, path);

    let words = request.count as usize * WORDS_PER_SECTOR;
    let block = geometry.block_address(request.cylinder, request.surface, request.sector);
    let contents: Vec<u16> = (0..words).map(|i| memory[i]).collect();
    print!("{}", pretty_print_octal_words(&contents, block as usize * WORDS_PER_SECTOR));
    Ok(())
}

/// Main run function; returns an exit code.
fn run(args: ArgMatches) -> u8 {
    return match _run(args) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };

    fn _run(args: ArgMatches) -> Result<(), String> {
        // Initialise logging.
        let level = match args.get_one::<LogLevel>(LOG_LEVEL) {
            Some(LogLevel::TRACE) | None => LevelFilter::Trace,
            Some(LogLevel::DEBUG) => LevelFilter::Debug,
            Some(LogLevel::INFO) => LevelFilter::Info,
        };
        init_logging(args.get_one::<String>(LOG_PATH), level)?;

        match args.subcommand() {
            Some(("info", sub_args)) => show_info(sub_args),
            Some(("create", sub_args)) => create_image(sub_args),
            Some(("dump", sub_args)) => dump_image(sub_args),
            _ => unreachable!(),
        }
    }
}

fn main() {
    let args = cli().get_matches();
    std::process::exit(run(args).into());
}
