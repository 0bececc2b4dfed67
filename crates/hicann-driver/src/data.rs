//! In-memory staged configuration of one HICANN.
//!
//! [`HicannData`] is the model a configurator pushes to hardware and the
//! reference the verify pass diffs readback against. Every buffer size comes
//! from [`hicann_chip::geometry`].

use std::fmt;

use hicann_chip::geometry::{
    BACKGROUND_GENERATORS, CROSSBAR_COLUMNS, CROSSBAR_ROWS, DNC_MERGERS, FG_BLOCKS,
    FG_CELLS_PER_BLOCK, FG_CELLS_PER_ROW, HORIZONTAL_REPEATERS, MERGER_TREE_NODES, NEURON_QUADS,
    SWITCH_SIDES, SYNAPSE_COLUMNS, SYNAPSE_DRIVERS, SYNAPSE_ROWS, SYNAPSE_SWITCH_COLUMNS,
    SYNAPSE_SWITCH_ROWS, VERTICAL_REPEATERS,
};
use hicann_chip::{AnalogOnHicann, HicannOnDnc};

/// Readable/writable subsystems of one HICANN, at readback granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Subsystem {
    /// Analog parameter storage.
    FloatingGates,
    /// Current stimulus sources.
    FgStimulus,
    /// Analog output multiplexers.
    AnalogReadout,
    /// Layer-1 merger tree.
    MergerTree,
    /// DNC merger line.
    DncMerger,
    /// FPGA-HICANN link configuration.
    GbitLink,
    /// Link phase configuration.
    Phase,
    /// L1 repeaters.
    Repeater,
    /// Crossbar switch matrices.
    CrossbarSwitches,
    /// Synapse switch matrices.
    SynapseSwitches,
    /// Synapse driver configuration.
    SynapseDrivers,
    /// 4-bit synapse weights.
    SynapseWeights,
    /// 4-bit synapse address decoders.
    SynapseDecoders,
    /// Denmem quad configuration.
    NeuronQuads,
    /// Global neuron configuration.
    NeuronConfig,
    /// Background event generators.
    BackgroundGenerators,
}

impl Subsystem {
    /// Name used in verification reports.
    pub const fn name(self) -> &'static str {
        match self {
            Self::FloatingGates => "floating_gates",
            Self::FgStimulus => "fg_stimulus",
            Self::AnalogReadout => "analog_readout",
            Self::MergerTree => "merger_tree",
            Self::DncMerger => "dnc_merger",
            Self::GbitLink => "gbitlink",
            Self::Phase => "phase",
            Self::Repeater => "repeater",
            Self::CrossbarSwitches => "crossbar_switches",
            Self::SynapseSwitches => "synapse_switches",
            Self::SynapseDrivers => "synapse_drivers",
            Self::SynapseWeights => "synapse_weights",
            Self::SynapseDecoders => "synapse_decoders",
            Self::NeuronQuads => "denmem_quads",
            Self::NeuronConfig => "neuron_config",
            Self::BackgroundGenerators => "background_generators",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Analog parameter storage, four blocks of raw 10-bit cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloatingGates {
    blocks: Vec<Vec<u16>>,
    programming_passes: usize,
}

impl Default for FloatingGates {
    fn default() -> Self {
        Self {
            blocks: vec![vec![0; FG_CELLS_PER_BLOCK]; FG_BLOCKS],
            programming_passes: 2,
        }
    }
}

impl FloatingGates {
    /// Raw cell value.
    pub fn get(&self, block: usize, cell: usize) -> u16 {
        self.blocks[block][cell]
    }

    /// Set a raw cell value.
    pub fn set(&mut self, block: usize, cell: usize, value: u16) {
        self.blocks[block][cell] = value;
    }

    /// Set every cell of every block to the same raw value.
    pub fn fill(&mut self, value: u16) {
        for block in &mut self.blocks {
            block.fill(value);
        }
    }

    /// Number of write passes used when programming the cells.
    pub fn programming_passes(&self) -> usize {
        self.programming_passes
    }
}

/// Current stimulus of one floating-gate block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FgStimulus {
    /// Pulse length applied to the stimulus.
    pub pulselength: u8,
    /// Sample values played back as the stimulus.
    pub samples: Vec<u16>,
}

impl Default for FgStimulus {
    fn default() -> Self {
        Self {
            pulselength: 15,
            samples: vec![0; FG_CELLS_PER_ROW],
        }
    }
}

/// Analog output multiplexer settings, one per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnalogReadout {
    sources: [Option<u8>; AnalogOnHicann::COUNT],
}

impl AnalogReadout {
    /// Route the given mux input to an analog channel.
    pub fn enable(&mut self, analog: AnalogOnHicann, source: u8) {
        self.sources[analog.value() as usize] = Some(source);
    }

    /// Currently routed source of a channel, if any.
    pub fn source(&self, analog: AnalogOnHicann) -> Option<u8> {
        self.sources[analog.value() as usize]
    }
}

/// One DNC merger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DncMerger {
    /// Slow mode for spike rate limiting.
    pub slow: bool,
    /// Input select.
    pub select: u8,
}

/// Direction of one FPGA-HICANN gigabit link channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GbitLinkDirection {
    /// Channel unused.
    #[default]
    Off,
    /// Chip receives pulses.
    ToHicann,
    /// Chip sends pulses.
    ToDnc,
}

/// Operating mode of one L1 repeater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepeaterMode {
    /// Repeater idle.
    #[default]
    Idle,
    /// Forward events along the bus.
    Forward,
    /// Inject test events.
    Output,
    /// Capture test events.
    Input,
}

/// All repeaters of one HICANN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repeaters {
    /// Horizontal bus repeaters.
    pub horizontal: Vec<RepeaterMode>,
    /// Vertical bus repeaters.
    pub vertical: Vec<RepeaterMode>,
}

impl Default for Repeaters {
    fn default() -> Self {
        Self {
            horizontal: vec![RepeaterMode::default(); HORIZONTAL_REPEATERS],
            vertical: vec![RepeaterMode::default(); VERTICAL_REPEATERS],
        }
    }
}

impl Repeaters {
    /// Total repeater count.
    pub fn len(&self) -> usize {
        self.horizontal.len() + self.vertical.len()
    }

    /// Whether there are no repeaters (never on real silicon).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A boolean switch matrix covering both chip sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchMatrix {
    rows: usize,
    columns: usize,
    switches: Vec<bool>,
}

impl SwitchMatrix {
    fn new(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            switches: vec![false; SWITCH_SIDES * rows * columns],
        }
    }

    /// Crossbar-sized matrix.
    pub fn crossbar() -> Self {
        Self::new(CROSSBAR_ROWS, CROSSBAR_COLUMNS)
    }

    /// Synapse-switch-sized matrix.
    pub fn synapse() -> Self {
        Self::new(SYNAPSE_SWITCH_ROWS, SYNAPSE_SWITCH_COLUMNS)
    }

    fn index(&self, side: usize, row: usize, column: usize) -> usize {
        debug_assert!(side < SWITCH_SIDES && row < self.rows && column < self.columns);
        (side * self.rows + row) * self.columns + column
    }

    /// Switch state.
    pub fn get(&self, side: usize, row: usize, column: usize) -> bool {
        self.switches[self.index(side, row, column)]
    }

    /// Set a switch.
    pub fn set(&mut self, side: usize, row: usize, column: usize, closed: bool) {
        let idx = self.index(side, row, column);
        self.switches[idx] = closed;
    }

    /// Number of switches in the matrix.
    pub fn len(&self) -> usize {
        self.switches.len()
    }

    /// Whether the matrix has no switches.
    pub fn is_empty(&self) -> bool {
        self.switches.is_empty()
    }

    /// Flat switch states, side-major.
    pub fn as_slice(&self) -> &[bool] {
        &self.switches
    }
}

/// Configuration of one synapse driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SynapseDriver {
    /// Driver listens on its L1 input.
    pub enable: bool,
    /// Mirror the input to the adjacent driver.
    pub mirror: bool,
    /// Conductance divisor selecting the synaptic strength range.
    pub gmax_divisor: u8,
}

/// The full synapse array: 4-bit weights and address decoders, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynapseArray {
    weights: Vec<u8>,
    decoders: Vec<u8>,
}

impl Default for SynapseArray {
    fn default() -> Self {
        Self {
            weights: vec![0; SYNAPSE_ROWS * SYNAPSE_COLUMNS],
            decoders: vec![0; SYNAPSE_ROWS * SYNAPSE_COLUMNS],
        }
    }
}

impl SynapseArray {
    fn index(row: usize, column: usize) -> usize {
        debug_assert!(row < SYNAPSE_ROWS && column < SYNAPSE_COLUMNS);
        row * SYNAPSE_COLUMNS + column
    }

    /// Weight of one synapse.
    pub fn weight(&self, row: usize, column: usize) -> u8 {
        self.weights[Self::index(row, column)]
    }

    /// Set the weight of one synapse (4 bit).
    pub fn set_weight(&mut self, row: usize, column: usize, weight: u8) {
        self.weights[Self::index(row, column)] = weight & 0xf;
    }

    /// Decoder value of one synapse.
    pub fn decoder(&self, row: usize, column: usize) -> u8 {
        self.decoders[Self::index(row, column)]
    }

    /// Set the decoder value of one synapse (4 bit).
    pub fn set_decoder(&mut self, row: usize, column: usize, decoder: u8) {
        self.decoders[Self::index(row, column)] = decoder & 0xf;
    }

    /// Set every weight to the same value.
    pub fn fill_weights(&mut self, weight: u8) {
        self.weights.fill(weight & 0xf);
    }

    /// Flat row-major weights.
    pub fn weights(&self) -> &[u8] {
        &self.weights
    }

    /// Flat row-major decoders.
    pub fn decoders(&self) -> &[u8] {
        &self.decoders
    }
}

/// Global neuron configuration bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NeuronConfig {
    /// Big capacitance mode, per side.
    pub big_cap: [bool; 2],
    /// Slow membrane leak, per side.
    pub slow_io: [bool; 2],
    /// Faster synaptic input OTA bias.
    pub fast_io: [bool; 2],
}

/// One background event generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackgroundGenerator {
    /// Generator emits events.
    pub enable: bool,
    /// Poisson mode instead of regular spacing.
    pub random: bool,
    /// Event period in clock cycles.
    pub period: u16,
    /// LFSR seed for Poisson mode.
    pub seed: u16,
}

impl Default for BackgroundGenerator {
    fn default() -> Self {
        Self {
            enable: false,
            random: false,
            period: 1000,
            seed: 1,
        }
    }
}

/// Staged configuration of one HICANN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HicannData {
    /// Chip revision, from the hardware database.
    pub version: u32,
    /// Analog parameter storage.
    pub floating_gates: FloatingGates,
    /// Current stimuli, one per floating-gate block.
    pub fg_stimulus: Vec<FgStimulus>,
    /// Analog output multiplexers.
    pub analog_readout: AnalogReadout,
    /// Layer-1 merger tree node configuration.
    pub merger_tree: Vec<u8>,
    /// DNC merger line.
    pub dnc_mergers: Vec<DncMerger>,
    /// Gigabit link channel directions.
    pub gbit_links: Vec<GbitLinkDirection>,
    /// Link phase, zero on all known systems.
    pub phase: u8,
    /// L1 repeaters.
    pub repeaters: Repeaters,
    /// Crossbar switches.
    pub crossbar_switches: SwitchMatrix,
    /// Synapse switches.
    pub synapse_switches: SwitchMatrix,
    /// Synapse drivers.
    pub synapse_drivers: Vec<SynapseDriver>,
    /// Synapse weights and decoders.
    pub synapses: SynapseArray,
    /// Denmem quad configuration bytes.
    pub neuron_quads: Vec<u8>,
    /// Global neuron configuration.
    pub neuron_config: NeuronConfig,
    /// Background event generators.
    pub background_generators: Vec<BackgroundGenerator>,
}

impl Default for HicannData {
    fn default() -> Self {
        Self {
            version: 4,
            floating_gates: FloatingGates::default(),
            fg_stimulus: vec![FgStimulus::default(); FG_BLOCKS],
            analog_readout: AnalogReadout::default(),
            merger_tree: vec![0; MERGER_TREE_NODES],
            dnc_mergers: vec![DncMerger::default(); DNC_MERGERS],
            gbit_links: vec![GbitLinkDirection::default(); DNC_MERGERS],
            phase: 0,
            repeaters: Repeaters::default(),
            crossbar_switches: SwitchMatrix::crossbar(),
            synapse_switches: SwitchMatrix::synapse(),
            synapse_drivers: vec![SynapseDriver::default(); SYNAPSE_DRIVERS],
            synapses: SynapseArray::default(),
            neuron_quads: vec![0; NEURON_QUADS],
            neuron_config: NeuronConfig::default(),
            background_generators: vec![BackgroundGenerator::default(); BACKGROUND_GENERATORS],
        }
    }
}

impl HicannData {
    /// Snapshot the named subsystem as a transferable block.
    pub fn block(&self, subsystem: Subsystem) -> Block {
        match subsystem {
            Subsystem::FloatingGates => Block::FloatingGates(self.floating_gates.clone()),
            Subsystem::FgStimulus => Block::FgStimulus(self.fg_stimulus.clone()),
            Subsystem::AnalogReadout => Block::AnalogReadout(self.analog_readout),
            Subsystem::MergerTree => Block::MergerTree(self.merger_tree.clone()),
            Subsystem::DncMerger => Block::DncMerger(self.dnc_mergers.clone()),
            Subsystem::GbitLink => Block::GbitLink(self.gbit_links.clone()),
            Subsystem::Phase => Block::Phase(self.phase),
            Subsystem::Repeater => Block::Repeater(self.repeaters.clone()),
            Subsystem::CrossbarSwitches => Block::CrossbarSwitches(self.crossbar_switches.clone()),
            Subsystem::SynapseSwitches => Block::SynapseSwitches(self.synapse_switches.clone()),
            Subsystem::SynapseDrivers => Block::SynapseDrivers(self.synapse_drivers.clone()),
            Subsystem::SynapseWeights => Block::SynapseWeights(self.synapses.weights().to_vec()),
            Subsystem::SynapseDecoders => Block::SynapseDecoders(self.synapses.decoders().to_vec()),
            Subsystem::NeuronQuads => Block::NeuronQuads(self.neuron_quads.clone()),
            Subsystem::NeuronConfig => Block::NeuronConfig(self.neuron_config),
            Subsystem::BackgroundGenerators => {
                Block::BackgroundGenerators(self.background_generators.clone())
            }
        }
    }
}

/// One subsystem's worth of configuration in transferable form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// See [`Subsystem::FloatingGates`].
    FloatingGates(FloatingGates),
    /// See [`Subsystem::FgStimulus`].
    FgStimulus(Vec<FgStimulus>),
    /// See [`Subsystem::AnalogReadout`].
    AnalogReadout(AnalogReadout),
    /// See [`Subsystem::MergerTree`].
    MergerTree(Vec<u8>),
    /// See [`Subsystem::DncMerger`].
    DncMerger(Vec<DncMerger>),
    /// See [`Subsystem::GbitLink`].
    GbitLink(Vec<GbitLinkDirection>),
    /// See [`Subsystem::Phase`].
    Phase(u8),
    /// See [`Subsystem::Repeater`].
    Repeater(Repeaters),
    /// See [`Subsystem::CrossbarSwitches`].
    CrossbarSwitches(SwitchMatrix),
    /// See [`Subsystem::SynapseSwitches`].
    SynapseSwitches(SwitchMatrix),
    /// See [`Subsystem::SynapseDrivers`].
    SynapseDrivers(Vec<SynapseDriver>),
    /// See [`Subsystem::SynapseWeights`].
    SynapseWeights(Vec<u8>),
    /// See [`Subsystem::SynapseDecoders`].
    SynapseDecoders(Vec<u8>),
    /// See [`Subsystem::NeuronQuads`].
    NeuronQuads(Vec<u8>),
    /// See [`Subsystem::NeuronConfig`].
    NeuronConfig(NeuronConfig),
    /// See [`Subsystem::BackgroundGenerators`].
    BackgroundGenerators(Vec<BackgroundGenerator>),
}

impl Block {
    /// The subsystem this block belongs to.
    pub const fn subsystem(&self) -> Subsystem {
        match self {
            Self::FloatingGates(_) => Subsystem::FloatingGates,
            Self::FgStimulus(_) => Subsystem::FgStimulus,
            Self::AnalogReadout(_) => Subsystem::AnalogReadout,
            Self::MergerTree(_) => Subsystem::MergerTree,
            Self::DncMerger(_) => Subsystem::DncMerger,
            Self::GbitLink(_) => Subsystem::GbitLink,
            Self::Phase(_) => Subsystem::Phase,
            Self::Repeater(_) => Subsystem::Repeater,
            Self::CrossbarSwitches(_) => Subsystem::CrossbarSwitches,
            Self::SynapseSwitches(_) => Subsystem::SynapseSwitches,
            Self::SynapseDrivers(_) => Subsystem::SynapseDrivers,
            Self::SynapseWeights(_) => Subsystem::SynapseWeights,
            Self::SynapseDecoders(_) => Subsystem::SynapseDecoders,
            Self::NeuronQuads(_) => Subsystem::NeuronQuads,
            Self::NeuronConfig(_) => Subsystem::NeuronConfig,
            Self::BackgroundGenerators(_) => Subsystem::BackgroundGenerators,
        }
    }
}

/// Per-reticle state of one FPGA: link flags and allocated HICANN slots.
#[derive(Debug, Clone, Default)]
pub struct FpgaData {
    highspeed_disabled: [bool; HicannOnDnc::COUNT],
    blacklisted: [bool; HicannOnDnc::COUNT],
    hicanns: [Option<Box<HicannData>>; HicannOnDnc::COUNT],
}

impl FpgaData {
    /// Use the highspeed link for the given slot (default on).
    pub fn set_highspeed(&mut self, slot: HicannOnDnc, use_highspeed: bool) {
        self.highspeed_disabled[slot.value() as usize] = !use_highspeed;
    }

    /// Whether the highspeed link is used for the given slot.
    pub fn highspeed(&self, slot: HicannOnDnc) -> bool {
        !self.highspeed_disabled[slot.value() as usize]
    }

    /// Exclude a slot from all configuration (default off).
    pub fn set_blacklisted(&mut self, slot: HicannOnDnc, blacklist: bool) {
        self.blacklisted[slot.value() as usize] = blacklist;
    }

    /// Whether a slot is excluded from configuration.
    pub fn blacklisted(&self, slot: HicannOnDnc) -> bool {
        self.blacklisted[slot.value() as usize]
    }

    /// Staged data of a slot, allocating defaults on first access.
    pub fn hicann_mut(&mut self, slot: HicannOnDnc) -> &mut HicannData {
        self.hicanns[slot.value() as usize].get_or_insert_with(Box::default)
    }

    /// Staged data of a slot, if allocated.
    pub fn hicann(&self, slot: HicannOnDnc) -> Option<&HicannData> {
        self.hicanns[slot.value() as usize].as_deref()
    }

    /// Slots with staged data, in enumeration order.
    pub fn allocated(&self) -> impl Iterator<Item = HicannOnDnc> + '_ {
        HicannOnDnc::iter_all().filter(|slot| self.hicanns[slot.value() as usize].is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_data_is_self_consistent() {
        let data = HicannData::default();
        assert_eq!(data.phase, 0);
        assert_eq!(data.synapse_drivers.len(), SYNAPSE_DRIVERS);
        assert_eq!(data.synapses.weights().len(), SYNAPSE_ROWS * SYNAPSE_COLUMNS);
        assert_eq!(data.repeaters.len(), HORIZONTAL_REPEATERS + VERTICAL_REPEATERS);
    }

    #[test]
    fn weights_are_masked_to_four_bits() {
        let mut data = HicannData::default();
        data.synapses.set_weight(0, 0, 0xff);
        assert_eq!(data.synapses.weight(0, 0), 0xf);
    }

    #[test]
    fn block_subsystem_roundtrip() {
        let data = HicannData::default();
        for subsystem in [
            Subsystem::FloatingGates,
            Subsystem::Phase,
            Subsystem::SynapseWeights,
            Subsystem::BackgroundGenerators,
        ] {
            assert_eq!(data.block(subsystem).subsystem(), subsystem);
        }
    }

    #[test]
    fn fpga_data_allocates_on_access() {
        let mut fpga = FpgaData::default();
        let slot = HicannOnDnc::new(3).unwrap();
        assert!(fpga.hicann(slot).is_none());
        fpga.hicann_mut(slot).synapses.set_weight(1, 2, 7);
        assert_eq!(fpga.allocated().collect::<Vec<_>>(), vec![slot]);
        assert_eq!(fpga.hicann(slot).unwrap().synapses.weight(1, 2), 7);
    }

    #[test]
    fn highspeed_defaults_on_blacklist_defaults_off() {
        let fpga = FpgaData::default();
        for slot in HicannOnDnc::iter_all() {
            assert!(fpga.highspeed(slot));
            assert!(!fpga.blacklisted(slot));
        }
    }
}
