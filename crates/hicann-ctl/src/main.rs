//! `hicann`: operational CLI for HICANN wafer systems.
//!
//! ```text
//! USAGE:
//!   hicann init --wafer W --hicann H [--jtag]    Bring up one HICANN
//!   hicann comm-test --wafer W --hicann H ...    Bring-up test with JTAG fallback
//!   hicann reticle-init --wafer W --fpga F ...   Configure whole reticles
//!   hicann verify --wafer W --hicann H           Configure, read back, diff
//!   hicann hwdb <dump|ip|adc> ...                Query the hardware database
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hicann_chip::{AnalogOnHicann, FpgaOnWafer, HicannOnDnc, HicannOnWafer, Wafer};
use hicann_driver::{
    configure, run_bringup, Configurator, DefectStore, HardwareDb, HicannConfigurator,
    JustResetConfigurator, LinkState, ProcessLinkOps, Settings, SimConnector, VerifyConfigurator,
    WaferData,
};

#[derive(Parser)]
#[command(name = "hicann", about = "HICANN wafer system CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Args)]
struct ChipArgs {
    /// Wafer enum.
    #[arg(long)]
    wafer: u16,
    /// HICANN-on-wafer enum.
    #[arg(long)]
    hicann: u16,
}

#[derive(Subcommand)]
enum Cmd {
    /// Initialize a single HICANN; everything else on its reticle is
    /// blacklisted for the run.
    Init {
        #[command(flatten)]
        chip: ChipArgs,
        /// Use JTAG instead of the highspeed link.
        #[arg(long)]
        jtag: bool,
        /// PLL frequency in MHz.
        #[arg(long)]
        pll: Option<u32>,
        /// Set all floating-gate values to zero and run the full
        /// programming cycle.
        #[arg(short = 'z', long = "zero-floating-gate")]
        zero_fg: bool,
        /// Set all synapse weights to zero.
        #[arg(short = 's', long = "zero-synapses")]
        zero_synapses: bool,
        /// Hardware database path override.
        #[arg(long)]
        hwdb: Option<PathBuf>,
    },

    /// Bring-up test for one HICANN: highspeed first, JTAG fallback,
    /// disposition persisted to the defect store.
    CommTest {
        #[command(flatten)]
        chip: ChipArgs,
        /// Defect store directory written by the test.
        #[arg(long)]
        backend_path: PathBuf,
        /// Allow a backend path that already holds defect files.
        #[arg(long)]
        skip_empty_backend_path_check: bool,
        /// PLL frequency in MHz.
        #[arg(long)]
        pll: Option<u32>,
        /// Set all synapse weights to zero during the highspeed attempt.
        #[arg(short = 's', long = "zero-synapses")]
        zero_synapses: bool,
    },

    /// Configure all HICANNs of one or more reticles with default settings.
    ReticleInit {
        /// Wafer enum.
        #[arg(long)]
        wafer: u16,
        /// FPGA-on-wafer enum(s).
        #[arg(long, num_args = 1.., required = true)]
        fpga: Vec<u8>,
        /// Set all floating-gate values to zero.
        #[arg(short = 'z', long = "zero-floating-gate")]
        zero_fg: bool,
        /// Reset and bring up only, leave chip state untouched.
        #[arg(long)]
        config_fpga_only: bool,
        /// Apply persisted defects before configuring.
        #[arg(long)]
        defects_path: Option<PathBuf>,
        /// Hardware database path override.
        #[arg(long)]
        hwdb: Option<PathBuf>,
    },

    /// Configure one HICANN, read everything back and report mismatches.
    Verify {
        #[command(flatten)]
        chip: ChipArgs,
        /// Count unreliable subsystems in the exit status as well.
        #[arg(long)]
        include_unreliable: bool,
        /// Hardware database path override.
        #[arg(long)]
        hwdb: Option<PathBuf>,
    },

    /// Hardware database queries.
    Hwdb {
        #[command(subcommand)]
        query: HwdbCmd,
    },
}

#[derive(Subcommand)]
enum HwdbCmd {
    /// Print the whole database as YAML.
    Dump {
        /// Hardware database path override.
        #[arg(long)]
        hwdb: Option<PathBuf>,
    },
    /// Print the control network address of one FPGA.
    Ip {
        /// Wafer enum.
        #[arg(long)]
        wafer: u16,
        /// FPGA-on-wafer enum.
        #[arg(long)]
        fpga: u8,
        /// Hardware database path override.
        #[arg(long)]
        hwdb: Option<PathBuf>,
    },
    /// Print the ADC wiring of one analog channel of a HICANN.
    Adc {
        #[command(flatten)]
        chip: ChipArgs,
        /// Analog channel.
        #[arg(long, default_value_t = 0)]
        analog: u8,
        /// Hardware database path override.
        #[arg(long)]
        hwdb: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Init {
            chip,
            jtag,
            pll,
            zero_fg,
            zero_synapses,
            hwdb,
        } => cmd_init(&chip, jtag, pll, zero_fg, zero_synapses, hwdb),
        Cmd::CommTest {
            chip,
            backend_path,
            skip_empty_backend_path_check,
            pll,
            zero_synapses,
        } => cmd_comm_test(
            &chip,
            backend_path,
            skip_empty_backend_path_check,
            pll,
            zero_synapses,
        ),
        Cmd::ReticleInit {
            wafer,
            fpga,
            zero_fg,
            config_fpga_only,
            defects_path,
            hwdb,
        } => cmd_reticle_init(wafer, &fpga, zero_fg, config_fpga_only, defects_path, hwdb),
        Cmd::Verify {
            chip,
            include_unreliable,
            hwdb,
        } => cmd_verify(&chip, include_unreliable, hwdb),
        Cmd::Hwdb { query } => cmd_hwdb(query),
    }
}

fn settings(hwdb: Option<PathBuf>, pll: Option<u32>) -> Settings {
    let mut settings = Settings::from_env();
    if let Some(path) = hwdb {
        settings.hwdb_path = path;
    }
    if let Some(pll) = pll {
        settings.pll_frequency_mhz = pll;
    }
    settings
}

fn parse_chip(chip: &ChipArgs) -> Result<(Wafer, HicannOnWafer)> {
    let wafer = Wafer::new(chip.wafer);
    let hicann = HicannOnWafer::new(chip.hicann)
        .with_context(|| format!("HICANN enum {} out of range", chip.hicann))?;
    Ok((wafer, hicann))
}

fn open_db(settings: &Settings) -> Result<HardwareDb> {
    HardwareDb::open(&settings.hwdb_path).with_context(|| {
        format!(
            "cannot load hardware database {}",
            settings.hwdb_path.display()
        )
    })
}

fn cmd_init(
    chip: &ChipArgs,
    jtag: bool,
    pll: Option<u32>,
    zero_fg: bool,
    zero_synapses: bool,
    hwdb: Option<PathBuf>,
) -> Result<()> {
    let settings = settings(hwdb, pll);
    let (wafer_c, hicann) = parse_chip(chip)?;
    let db = open_db(&settings)?;

    let mut wafer = WaferData::new(wafer_c);
    {
        let data = wafer.hicann_mut(hicann);
        if zero_fg {
            data.floating_gates.fill(0);
        }
        if zero_synapses {
            data.synapses.fill_weights(0);
        }
    }

    // Blacklist every other slot on the reticle for this run.
    let fpga = wafer.fpga_mut(hicann.fpga());
    for slot in HicannOnDnc::iter_all() {
        if slot != hicann.on_dnc() {
            fpga.set_blacklisted(slot, true);
        }
    }
    if jtag {
        fpga.set_highspeed(hicann.on_dnc(), false);
    }

    let connector = SimConnector::new();
    let mut conn = wafer.connect(&db, &connector)?;
    // Zeroed floating gates need the full programming cycle; otherwise a
    // reset and bring-up is all the init does.
    if zero_fg {
        configure(&wafer, &mut conn, &HicannConfigurator::new())?;
    } else {
        configure(&wafer, &mut conn, &JustResetConfigurator)?;
    }

    println!(
        "{} initialized via {}",
        hicann.global(wafer_c),
        if jtag { "jtag" } else { "highspeed" }
    );
    Ok(())
}

fn cmd_comm_test(
    chip: &ChipArgs,
    backend_path: PathBuf,
    skip_empty_backend_path_check: bool,
    pll: Option<u32>,
    zero_synapses: bool,
) -> Result<()> {
    let settings = settings(None, pll);
    let (wafer_c, hicann) = parse_chip(chip)?;
    let hicann = hicann.global(wafer_c);

    let store = DefectStore::new(&backend_path);
    if !skip_empty_backend_path_check && !store.is_empty()? {
        bail!("{} is not empty", backend_path.display());
    }

    let program = std::env::current_exe().context("cannot locate own executable")?;
    let mut ops = ProcessLinkOps::new(program, hicann, settings.pll_frequency_mhz, zero_synapses);

    let state = run_bringup(hicann, &mut ops, &store)?;
    println!("{hicann}: {state}");
    if state == LinkState::BothFailed {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_reticle_init(
    wafer: u16,
    fpgas: &[u8],
    zero_fg: bool,
    config_fpga_only: bool,
    defects_path: Option<PathBuf>,
    hwdb: Option<PathBuf>,
) -> Result<()> {
    let mut settings = settings(hwdb, None);
    if let Some(path) = defects_path {
        settings.defects_path = path;
    }
    let wafer_c = Wafer::new(wafer);
    let db = open_db(&settings)?;

    let mut wafer = WaferData::new(wafer_c);
    for &f in fpgas {
        let fpga = FpgaOnWafer::new(f).with_context(|| format!("FPGA enum {f} out of range"))?;
        for slot in HicannOnDnc::iter_all() {
            let data = wafer.hicann_mut(slot.on_wafer(fpga.dnc()));
            if zero_fg {
                data.floating_gates.fill(0);
            }
        }
    }
    wafer.apply_defects(&DefectStore::new(&settings.defects_path))?;

    let connector = SimConnector::new();
    let mut conn = wafer.connect(&db, &connector)?;
    let configurator: Box<dyn Configurator> = if config_fpga_only {
        Box::new(JustResetConfigurator)
    } else {
        Box::new(HicannConfigurator::new())
    };
    configure(&wafer, &mut conn, configurator.as_ref())?;

    println!("{wafer_c}: initialized {} reticle(s)", fpgas.len());
    Ok(())
}

fn cmd_verify(chip: &ChipArgs, include_unreliable: bool, hwdb: Option<PathBuf>) -> Result<()> {
    let settings = settings(hwdb, None);
    let (wafer_c, hicann) = parse_chip(chip)?;
    let db = open_db(&settings)?;

    let mut wafer = WaferData::new(wafer_c);
    wafer.hicann_mut(hicann);

    let connector = SimConnector::new();
    let mut conn = wafer.connect(&db, &connector)?;
    configure(&wafer, &mut conn, &HicannConfigurator::new())?;

    let verify = VerifyConfigurator::new();
    configure(&wafer, &mut conn, &verify)?;

    println!("{verify}");
    let errors = verify.error_count(include_unreliable);
    println!("total: {errors} error(s)");
    if errors > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_hwdb(query: HwdbCmd) -> Result<()> {
    match query {
        HwdbCmd::Dump { hwdb } => {
            let db = open_db(&settings(hwdb, None))?;
            print!("{db}");
        }
        HwdbCmd::Ip { wafer, fpga, hwdb } => {
            let db = open_db(&settings(hwdb, None))?;
            let fpga = FpgaOnWafer::new(fpga)
                .with_context(|| format!("FPGA enum {fpga} out of range"))?
                .global(Wafer::new(wafer));
            println!("{}", db.get_fpga_ip(fpga)?);
        }
        HwdbCmd::Adc { chip, analog, hwdb } => {
            let db = open_db(&settings(hwdb, None))?;
            let (wafer_c, hicann) = parse_chip(&chip)?;
            let analog = AnalogOnHicann::new(analog)
                .with_context(|| format!("analog channel {analog} out of range"))?;
            let cfg = db.get_adc_of_hicann(hicann.global(wafer_c), analog)?;
            println!("adc     : {}", cfg.coord);
            println!("channel : {}", cfg.channel);
            println!("trigger : {}", cfg.trigger);
            if let Some((ip, port)) = cfg.remote {
                println!("remote  : {ip}:{port}");
            }
        }
    }
    Ok(())
}
