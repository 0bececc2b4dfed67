//! Readback verification.
//!
//! [`VerifyConfigurator`] walks the same traversal as a configuration run
//! but only reads: each subsystem is fetched from the link and diffed
//! against the staged model. It never mutates chip state: `config_fpga`
//! neither resets nor brings up channels.
//!
//! Not everything can be checked. The floating gates and the GBit links
//! have no readback path at all (`readable = false`); denmem quads read
//! back, but reading disturbs the stored values, so their result is marked
//! `reliable = false` and excluded from the error total. Rev-4 chips answer
//! reads on synapse drivers 110..=113 with bogus data; the affected drivers
//! and rows are excluded from comparison instead of producing phantom
//! errors.

use std::fmt;
use std::sync::Mutex;

use tracing::{debug, info, warn};

use hicann_chip::revision::{synapse_driver_unusable, synapse_row_unusable};
use hicann_chip::{AnalogOnHicann, HicannGlobal, HicannOnDnc};

use hicann_chip::geometry::{SYNAPSE_COLUMNS, SYNAPSE_ROWS};

use crate::data::{Block, FpgaData, HicannData, Subsystem};
use crate::error::{DriverError, Result};
use crate::wafer::FpgaLink;

/// Readback order. The same subsystems a full configuration run writes,
/// minus nothing; unreadable subsystems are reported as such.
pub const VERIFY_ORDER: &[Subsystem] = &[
    Subsystem::FgStimulus,
    Subsystem::FloatingGates,
    Subsystem::AnalogReadout,
    Subsystem::MergerTree,
    Subsystem::DncMerger,
    Subsystem::GbitLink,
    Subsystem::Phase,
    Subsystem::Repeater,
    Subsystem::SynapseSwitches,
    Subsystem::CrossbarSwitches,
    Subsystem::SynapseDrivers,
    Subsystem::SynapseWeights,
    Subsystem::SynapseDecoders,
    Subsystem::NeuronQuads,
    Subsystem::NeuronConfig,
    Subsystem::BackgroundGenerators,
];

/// Outcome of reading back one subsystem of one HICANN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    /// The HICANN that was read.
    pub hicann: HicannGlobal,
    /// Subsystem that was read.
    pub subsystem: Subsystem,
    /// Description of the mismatches, empty when clean.
    pub msg: String,
    /// Number of compared entities (a synapse weight, a repeater, ...).
    pub tested: usize,
    /// Number of compared entities that mismatched.
    pub errors: usize,
    /// False if the read values cannot be trusted.
    pub reliable: bool,
    /// False if the subsystem cannot be read at all.
    pub readable: bool,
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.readable {
            write!(
                f,
                "{} {}: {} errors ({} checked)",
                self.hicann, self.subsystem, self.errors, self.tested
            )?;
            if !self.reliable {
                write!(f, " (values are not reliably readable)")?;
            }
            Ok(())
        } else {
            write!(f, "{} {}: not readable", self.hicann, self.subsystem)
        }
    }
}

/// Reads the configuration back and compares it to the staged model.
///
/// Results accumulate across runs until [`VerifyConfigurator::clear`] is
/// called, so a tool can verify several wafers into one report.
#[derive(Debug, Default)]
pub struct VerifyConfigurator {
    results: Mutex<Vec<VerificationResult>>,
}

impl VerifyConfigurator {
    /// Create with an empty result list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all stored results.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Snapshot of the stored results.
    pub fn results(&self) -> Vec<VerificationResult> {
        self.lock().clone()
    }

    /// Sum of errors over all readable results; unreliable subsystems are
    /// excluded unless `include_unreliable` is set.
    pub fn error_count(&self, include_unreliable: bool) -> usize {
        self.lock()
            .iter()
            .filter(|r| r.readable && (r.reliable || include_unreliable))
            .map(|r| r.errors)
            .sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<VerificationResult>> {
        self.results
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn post(&self, result: VerificationResult) {
        if !result.readable {
            debug!("{} {}: NOT TESTED", result.hicann, result.subsystem);
        } else if result.errors > 0 {
            warn!(
                "{} {}: FAILED{}",
                result.hicann,
                result.subsystem,
                if result.reliable { "" } else { " (UNRELIABLE)" }
            );
        } else {
            debug!("{} {}: OK", result.hicann, result.subsystem);
        }
        self.lock().push(result);
    }
}

impl crate::configure::Configurator for VerifyConfigurator {
    /// FPGA state has no readback path; deliberately does not reset either.
    fn config_fpga(&self, link: &mut FpgaLink, _fpga: &FpgaData) -> Result<()> {
        debug!("{}: nothing to read back at FPGA level", link.fpga);
        Ok(())
    }

    fn config(&self, link: &mut FpgaLink, slot: HicannOnDnc, data: &HicannData) -> Result<()> {
        let hicann = slot.on_wafer(link.fpga.fpga.dnc()).global(link.fpga.wafer);
        info!("read back HICANN {hicann}");
        for &subsystem in VERIFY_ORDER {
            match subsystem {
                Subsystem::FloatingGates | Subsystem::GbitLink => {
                    self.post(VerificationResult {
                        hicann,
                        subsystem,
                        msg: String::new(),
                        tested: 0,
                        errors: 0,
                        reliable: false,
                        readable: false,
                    });
                }
                _ => {
                    let read = link.link.read_block(slot, subsystem)?;
                    let expected = data.block(subsystem);
                    let (tested, errors, msg) = diff_blocks(&expected, &read, data.version)?;
                    self.post(VerificationResult {
                        hicann,
                        subsystem,
                        msg,
                        tested,
                        errors,
                        reliable: subsystem != Subsystem::NeuronQuads,
                        readable: true,
                    });
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for VerifyConfigurator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerifyConfigurator:")?;
        for result in self.lock().iter() {
            write!(f, "\n    {result}")?;
        }
        Ok(())
    }
}

fn mismatch<T: fmt::Debug>(prefix: &str, expected: &T, read: &T) -> String {
    format!("{prefix}: configured {read:?}, expected {expected:?}")
}

/// Compare one element, extending (tested, errors, msg) accordingly.
fn check<T: PartialEq + fmt::Debug>(
    prefix: &str,
    expected: &T,
    read: &T,
    tested: &mut usize,
    errors: &mut usize,
    msg: &mut Vec<String>,
) {
    *tested += 1;
    if expected != read {
        *errors += 1;
        msg.push(mismatch(prefix, expected, read));
    }
}

fn check_slices<T: PartialEq + fmt::Debug>(
    what: &str,
    expected: &[T],
    read: &[T],
    tested: &mut usize,
    errors: &mut usize,
    msg: &mut Vec<String>,
) -> Result<()> {
    if expected.len() != read.len() {
        return Err(DriverError::transfer_failed(format!(
            "{what}: read {} entries, expected {}",
            read.len(),
            expected.len()
        )));
    }
    for (i, (e, r)) in expected.iter().zip(read.iter()).enumerate() {
        check(&format!("{what} {i}"), e, r, tested, errors, msg);
    }
    Ok(())
}

/// Element-wise diff of a read block against the staged one.
///
/// Returns `(tested, errors, msg)`. Shape mismatches are transfer errors,
/// not verification errors.
fn diff_blocks(expected: &Block, read: &Block, version: u32) -> Result<(usize, usize, String)> {
    let mut tested = 0;
    let mut errors = 0;
    let mut msg = Vec::new();

    match (expected, read) {
        (Block::FgStimulus(e), Block::FgStimulus(r)) => {
            check_slices("fg block", e, r, &mut tested, &mut errors, &mut msg)?;
        }
        (Block::AnalogReadout(e), Block::AnalogReadout(r)) => {
            for analog in AnalogOnHicann::iter_all() {
                check(
                    &format!("analog {analog}"),
                    &e.source(analog),
                    &r.source(analog),
                    &mut tested,
                    &mut errors,
                    &mut msg,
                );
            }
        }
        (Block::MergerTree(e), Block::MergerTree(r)) => {
            check("merger tree", e, r, &mut tested, &mut errors, &mut msg);
        }
        (Block::DncMerger(e), Block::DncMerger(r)) => {
            check("dnc merger line", e, r, &mut tested, &mut errors, &mut msg);
        }
        (Block::Phase(e), Block::Phase(r)) => {
            check("phase", e, r, &mut tested, &mut errors, &mut msg);
        }
        (Block::Repeater(e), Block::Repeater(r)) => {
            check_slices(
                "horizontal repeater",
                &e.horizontal,
                &r.horizontal,
                &mut tested,
                &mut errors,
                &mut msg,
            )?;
            check_slices(
                "vertical repeater",
                &e.vertical,
                &r.vertical,
                &mut tested,
                &mut errors,
                &mut msg,
            )?;
        }
        (Block::CrossbarSwitches(e), Block::CrossbarSwitches(r)) => {
            check_slices(
                "crossbar switch",
                e.as_slice(),
                r.as_slice(),
                &mut tested,
                &mut errors,
                &mut msg,
            )?;
        }
        (Block::SynapseSwitches(e), Block::SynapseSwitches(r)) => {
            check_slices(
                "synapse switch",
                e.as_slice(),
                r.as_slice(),
                &mut tested,
                &mut errors,
                &mut msg,
            )?;
        }
        (Block::SynapseDrivers(e), Block::SynapseDrivers(r)) => {
            if e.len() != r.len() {
                return Err(DriverError::transfer_failed("synapse driver count mismatch"));
            }
            for (driver, (ed, rd)) in e.iter().zip(r.iter()).enumerate() {
                if synapse_driver_unusable(version, driver) {
                    continue;
                }
                check(
                    &format!("synapse driver {driver}"),
                    ed,
                    rd,
                    &mut tested,
                    &mut errors,
                    &mut msg,
                );
            }
        }
        (Block::SynapseWeights(e), Block::SynapseWeights(r))
        | (Block::SynapseDecoders(e), Block::SynapseDecoders(r)) => {
            diff_synapse_values(expected.subsystem(), e, r, version, &mut tested, &mut errors, &mut msg)?;
        }
        (Block::NeuronQuads(e), Block::NeuronQuads(r)) => {
            check_slices("denmem quad", e, r, &mut tested, &mut errors, &mut msg)?;
        }
        (Block::NeuronConfig(e), Block::NeuronConfig(r)) => {
            check("neuron config", e, r, &mut tested, &mut errors, &mut msg);
        }
        (Block::BackgroundGenerators(e), Block::BackgroundGenerators(r)) => {
            check_slices(
                "background generator",
                e,
                r,
                &mut tested,
                &mut errors,
                &mut msg,
            )?;
        }
        _ => {
            return Err(DriverError::transfer_failed(format!(
                "read back {} for {}",
                read.subsystem(),
                expected.subsystem()
            )));
        }
    }

    Ok((tested, errors, msg.join("\n")))
}

fn diff_synapse_values(
    subsystem: Subsystem,
    expected: &[u8],
    read: &[u8],
    version: u32,
    tested: &mut usize,
    errors: &mut usize,
    msg: &mut Vec<String>,
) -> Result<()> {
    if expected.len() != read.len() || expected.len() != SYNAPSE_ROWS * SYNAPSE_COLUMNS {
        return Err(DriverError::transfer_failed(format!(
            "{subsystem}: unexpected array size {}",
            read.len()
        )));
    }
    for row in 0..SYNAPSE_ROWS {
        if synapse_row_unusable(version, row) {
            continue;
        }
        for column in 0..SYNAPSE_COLUMNS {
            let idx = row * SYNAPSE_COLUMNS + column;
            check(
                &format!("synapse ({row}, {column})"),
                &expected[idx],
                &read[idx],
                tested,
                errors,
                msg,
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hicann_chip::{HicannOnWafer, Wafer};

    fn result(subsystem: Subsystem, errors: usize, reliable: bool, readable: bool) -> VerificationResult {
        VerificationResult {
            hicann: HicannOnWafer::new(0).unwrap().global(Wafer::new(0)),
            subsystem,
            msg: String::new(),
            tested: if readable { 10 } else { 0 },
            errors,
            reliable,
            readable,
        }
    }

    #[test]
    fn error_count_excludes_unreliable_and_unreadable() {
        let verify = VerifyConfigurator::new();
        verify.post(result(Subsystem::SynapseWeights, 5, true, true));
        verify.post(result(Subsystem::NeuronQuads, 3, false, true));
        verify.post(result(Subsystem::FloatingGates, 0, false, false));
        verify.post(result(Subsystem::Phase, 1, true, true));

        assert_eq!(verify.error_count(false), 6);
        assert_eq!(verify.error_count(true), 9);
    }

    #[test]
    fn results_accumulate_until_cleared() {
        let verify = VerifyConfigurator::new();
        verify.post(result(Subsystem::Phase, 0, true, true));
        verify.post(result(Subsystem::Phase, 0, true, true));
        assert_eq!(verify.results().len(), 2);
        verify.clear();
        assert!(verify.results().is_empty());
    }

    #[test]
    fn diff_counts_every_divergent_weight() {
        let mut data = HicannData::default();
        let expected = data.block(Subsystem::SynapseWeights);
        data.synapses.set_weight(0, 0, 7);
        data.synapses.set_weight(10, 200, 3);
        data.synapses.set_weight(447, 255, 1);
        let read = data.block(Subsystem::SynapseWeights);

        let (tested, errors, msg) = diff_blocks(&expected, &read, 2).unwrap();
        assert_eq!(tested, SYNAPSE_ROWS * SYNAPSE_COLUMNS);
        assert_eq!(errors, 3);
        assert_eq!(msg.lines().count(), 3);
    }

    #[test]
    fn rev4_dead_rows_are_excluded() {
        let mut data = HicannData::default();
        let expected = data.block(Subsystem::SynapseWeights);
        // Row 220 belongs to driver 110, dead on rev 4.
        data.synapses.set_weight(220, 0, 9);
        let read = data.block(Subsystem::SynapseWeights);

        let (tested, errors, _) = diff_blocks(&expected, &read, 4).unwrap();
        assert_eq!(tested, (SYNAPSE_ROWS - 8) * SYNAPSE_COLUMNS);
        assert_eq!(errors, 0);

        let (_, errors_v2, _) = diff_blocks(&expected, &read, 2).unwrap();
        assert_eq!(errors_v2, 1);
    }

    #[test]
    fn shape_mismatch_is_a_transfer_error() {
        let data = HicannData::default();
        let expected = data.block(Subsystem::SynapseWeights);
        let read = data.block(Subsystem::Phase);
        assert!(diff_blocks(&expected, &read, 2).is_err());
    }
}
