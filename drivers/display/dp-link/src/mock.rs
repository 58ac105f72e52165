//! Scripted sink, PHY and platform models for tests.

use core::cell::{Cell, RefCell};
use std::rc::Rc;
use std::vec::Vec;

use helix_dp_core::dpcd::{self, regs};
use helix_dp_core::{
    AuxChannel, AuxError, DriveLevel, LaneCount, LinkRate, PhyController, PhyError, Platform,
    TrainingPattern, MAX_LANES,
};

const DPCD_SIZE: usize = 0x300;

/// Lane status nibble with CR, EQ and symbol lock
const LANE_LOCKED: u8 = 0x7;
/// Lane status nibble with CR only
const LANE_CR: u8 = 0x1;

// =============================================================================
// SINK
// =============================================================================

/// How the sink answers adjust-request reads
#[derive(Debug, Clone, Copy)]
pub enum AdjustScript {
    /// Same bytes every time
    Fixed([u8; 2]),
    /// Alternate between two values, first one first
    Alternating([u8; 2], [u8; 2]),
}

/// DPCD image with a scripted training response
#[derive(Debug)]
pub struct MockSink {
    image: [u8; DPCD_SIZE],
    cr_done_after: Option<u32>,
    eq_done_after: Option<u32>,
    max_trainable_rate: Option<LinkRate>,
    lose_cr_in_eq_above: Option<LinkRate>,
    adjust: AdjustScript,
    adjust_reads: u32,
    rounds: u32,
    failing_read: Option<(u32, u32)>,
    forced_status: Option<[u8; 3]>,
    forced_status_once: Option<[u8; 3]>,
    sink_count_after: Option<u32>,
    sink_count_reads: u32,
    unplugged: Option<Rc<Cell<bool>>>,
    /// Every write, in order
    pub writes: Vec<(u32, Vec<u8>)>,
    /// Writes issued after the unplug flag was raised
    pub writes_after_unplug: usize,
}

impl MockSink {
    /// Sink advertising `rate` x `lanes` with enhanced framing and one sink
    pub fn new(rate: LinkRate, lanes: LaneCount) -> Self {
        let mut image = [0u8; DPCD_SIZE];
        image[regs::DPCD_REV as usize] = 0x12;
        image[regs::MAX_LINK_RATE as usize] = rate.code();
        image[regs::MAX_LANE_COUNT as usize] = lanes.count() | dpcd::ENHANCED_FRAME_CAP;
        image[regs::SINK_COUNT as usize] = 1;
        Self {
            image,
            cr_done_after: None,
            eq_done_after: None,
            max_trainable_rate: None,
            lose_cr_in_eq_above: None,
            adjust: AdjustScript::Fixed([0, 0]),
            adjust_reads: 0,
            rounds: 0,
            failing_read: None,
            forced_status: None,
            forced_status_once: None,
            sink_count_after: None,
            sink_count_reads: 0,
            unplugged: None,
            writes: Vec::new(),
            writes_after_unplug: 0,
        }
    }

    pub fn with_tps3(mut self) -> Self {
        self.image[regs::MAX_LANE_COUNT as usize] |= dpcd::TPS3_SUPPORTED;
        self
    }

    pub fn with_tps4(mut self) -> Self {
        self.image[regs::MAX_DOWNSPREAD as usize] |= dpcd::TPS4_SUPPORTED;
        self
    }

    pub fn with_raw_lane_count(mut self, count: u8) -> Self {
        let byte = &mut self.image[regs::MAX_LANE_COUNT as usize];
        *byte = (*byte & !dpcd::MAX_LANE_COUNT_MASK) | count;
        self
    }

    pub fn with_aux_rd_interval(mut self, interval: u8) -> Self {
        self.image[regs::TRAINING_AUX_RD_INTERVAL as usize] = interval;
        self
    }

    /// Report CR done from the n-th TPS1 round on
    pub fn cr_done_after(mut self, rounds: u32) -> Self {
        self.cr_done_after = Some(rounds);
        self
    }

    /// Report EQ, symbol lock and alignment from the n-th EQ round on
    pub fn eq_done_after(mut self, rounds: u32) -> Self {
        self.eq_done_after = Some(rounds);
        self
    }

    /// Never recover the clock above `rate`
    pub fn max_trainable_rate(mut self, rate: LinkRate) -> Self {
        self.max_trainable_rate = Some(rate);
        self
    }

    /// Drop CR during equalization at rates above `rate`
    pub fn lose_cr_in_eq_above(mut self, rate: LinkRate) -> Self {
        self.lose_cr_in_eq_above = Some(rate);
        self
    }

    pub fn adjust_fixed(mut self, raw: [u8; 2]) -> Self {
        self.adjust = AdjustScript::Fixed(raw);
        self
    }

    pub fn adjust_alternating(mut self, first: [u8; 2], second: [u8; 2]) -> Self {
        self.adjust = AdjustScript::Alternating(first, second);
        self
    }

    /// Sink count reads as zero for the first `reads` reads
    pub fn sink_count_after(mut self, reads: u32) -> Self {
        self.sink_count_after = Some(reads);
        self
    }

    /// Fail the next `count` reads starting at `address`
    pub fn fail_reads_at(&mut self, address: u32, count: u32) {
        self.failing_read = Some((address, count));
    }

    /// Report these `LANE0_1_STATUS..LANE_ALIGN_STATUS_UPDATED` bytes
    pub fn force_lane_status(&mut self, raw: [u8; 3]) {
        self.forced_status = Some(raw);
    }

    /// Report these status bytes for a single read
    pub fn force_lane_status_once(&mut self, raw: [u8; 3]) {
        self.forced_status_once = Some(raw);
    }

    pub fn share_unplug_flag(&mut self, flag: Rc<Cell<bool>>) {
        self.unplugged = Some(flag);
    }

    pub fn poke(&mut self, address: u32, value: u8) {
        self.image[address as usize] = value;
    }

    /// Data of the last write starting at `address`
    pub fn written(&self, address: u32) -> Option<Vec<u8>> {
        self.writes
            .iter()
            .rev()
            .find(|(addr, _)| *addr == address)
            .map(|(_, data)| data.clone())
    }

    /// Every value written to `TRAINING_PATTERN_SET`
    pub fn pattern_writes(&self) -> Vec<u8> {
        self.writes
            .iter()
            .filter(|(addr, _)| *addr == regs::TRAINING_PATTERN_SET)
            .map(|(_, data)| data[0])
            .collect()
    }

    fn rate_trainable(&self) -> bool {
        let code = self.image[regs::LINK_BW_SET as usize];
        self.max_trainable_rate
            .map_or(true, |max| code <= max.code())
    }

    fn lane_status(&mut self) -> [u8; 3] {
        if let Some(raw) = self.forced_status_once.take() {
            return raw;
        }
        if let Some(raw) = self.forced_status {
            return raw;
        }

        let pattern = self.image[regs::TRAINING_PATTERN_SET as usize] & 0x0F;
        let both = |nibble: u8| nibble | (nibble << 4);
        let reached = |target: Option<u32>, rounds: u32| target.map_or(false, |n| rounds >= n);

        match pattern {
            0 => [both(LANE_LOCKED), both(LANE_LOCKED), 0x01],
            1 => {
                if self.rate_trainable() && reached(self.cr_done_after, self.rounds) {
                    [both(LANE_CR), both(LANE_CR), 0x00]
                } else {
                    [0x00, 0x00, 0x00]
                }
            },
            _ => {
                let code = self.image[regs::LINK_BW_SET as usize];
                let cr_lost = self
                    .lose_cr_in_eq_above
                    .map_or(false, |rate| code > rate.code());
                if cr_lost {
                    [0x00, 0x00, 0x00]
                } else if reached(self.eq_done_after, self.rounds) {
                    [both(LANE_LOCKED), both(LANE_LOCKED), 0x01]
                } else {
                    [both(LANE_CR), both(LANE_CR), 0x00]
                }
            },
        }
    }

    fn adjust_request(&mut self) -> [u8; 2] {
        let raw = match self.adjust {
            AdjustScript::Fixed(raw) => raw,
            AdjustScript::Alternating(first, second) => {
                if self.adjust_reads % 2 == 0 {
                    first
                } else {
                    second
                }
            },
        };
        self.adjust_reads += 1;
        raw
    }

    fn sink_count(&mut self) -> u8 {
        self.sink_count_reads += 1;
        match self.sink_count_after {
            Some(n) if self.sink_count_reads <= n => 0,
            _ => self.image[regs::SINK_COUNT as usize],
        }
    }
}

impl AuxChannel for MockSink {
    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), AuxError> {
        if let Some((addr, remaining)) = self.failing_read {
            if addr == address && remaining > 0 {
                self.failing_read = Some((addr, remaining - 1));
                return Err(AuxError::Timeout);
            }
        }

        let start = address as usize;
        let end = start + buf.len();
        if end > DPCD_SIZE {
            return Err(AuxError::Nack);
        }
        buf.copy_from_slice(&self.image[start..end]);

        let status_start = regs::LANE0_1_STATUS as usize;
        if start < status_start + 3 && end > status_start {
            let status = self.lane_status();
            for (i, byte) in status.iter().enumerate() {
                let addr = status_start + i;
                if (start..end).contains(&addr) {
                    buf[addr - start] = *byte;
                }
            }
        }

        let adjust_start = regs::ADJUST_REQUEST_LANE0_1 as usize;
        if start == adjust_start {
            let adjust = self.adjust_request();
            for (i, byte) in adjust.iter().enumerate().take(buf.len()) {
                buf[i] = *byte;
            }
        }

        let sink_count = regs::SINK_COUNT as usize;
        if start == sink_count {
            buf[0] = self.sink_count();
        }

        Ok(())
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), AuxError> {
        if self.unplugged.as_ref().map_or(false, |flag| flag.get()) {
            self.writes_after_unplug += 1;
        }

        let start = address as usize;
        let end = start + data.len();
        if end > DPCD_SIZE {
            return Err(AuxError::Nack);
        }
        self.image[start..end].copy_from_slice(data);
        self.writes.push((address, data.to_vec()));

        match address {
            regs::TRAINING_PATTERN_SET => self.rounds = 0,
            regs::TRAINING_LANE0_SET => self.rounds += 1,
            _ => {},
        }
        Ok(())
    }
}

// =============================================================================
// PHY
// =============================================================================

/// One recorded PHY call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhyCall {
    Reset(bool),
    SetLinkRate(LinkRate),
    SetLaneCount(LaneCount),
    SetEnhancedFraming(bool),
    ModeSetting,
    PostInit,
    WaitPllLock,
    SetDrive([DriveLevel; MAX_LANES], [DriveLevel; MAX_LANES]),
    SetTrainingPattern(TrainingPattern),
}

/// PHY that records every programming call
#[derive(Debug, Default)]
pub struct MockPhy {
    /// Calls in order
    pub calls: Vec<PhyCall>,
    rate: Option<LinkRate>,
    lanes: Option<LaneCount>,
    pll_fails: bool,
}

impl MockPhy {
    pub fn new() -> Self {
        Self::default()
    }

    /// PHY already running at `rate` x `lanes`
    pub fn configured(rate: LinkRate, lanes: LaneCount) -> Self {
        Self {
            rate: Some(rate),
            lanes: Some(lanes),
            ..Self::default()
        }
    }

    pub fn pll_never_locks(mut self) -> Self {
        self.pll_fails = true;
        self
    }

    pub fn patterns(&self) -> Vec<TrainingPattern> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                PhyCall::SetTrainingPattern(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    pub fn last_drive(&self) -> Option<([DriveLevel; MAX_LANES], [DriveLevel; MAX_LANES])> {
        self.calls.iter().rev().find_map(|call| match call {
            PhyCall::SetDrive(swing, pre) => Some((*swing, *pre)),
            _ => None,
        })
    }
}

impl PhyController for MockPhy {
    fn reset(&mut self, assert: bool) {
        self.calls.push(PhyCall::Reset(assert));
    }

    fn set_link_rate(&mut self, rate: LinkRate) {
        self.rate = Some(rate);
        self.calls.push(PhyCall::SetLinkRate(rate));
    }

    fn set_lane_count(&mut self, lanes: LaneCount) {
        self.lanes = Some(lanes);
        self.calls.push(PhyCall::SetLaneCount(lanes));
    }

    fn set_enhanced_framing(&mut self, enable: bool) {
        self.calls.push(PhyCall::SetEnhancedFraming(enable));
    }

    fn mode_setting(&mut self) {
        self.calls.push(PhyCall::ModeSetting);
    }

    fn post_init(&mut self) {
        self.calls.push(PhyCall::PostInit);
    }

    fn wait_pll_lock(&mut self) -> Result<(), PhyError> {
        self.calls.push(PhyCall::WaitPllLock);
        if self.pll_fails {
            Err(PhyError::PllLockTimeout)
        } else {
            Ok(())
        }
    }

    fn set_voltage_pre_emphasis(
        &mut self,
        swing: &[DriveLevel; MAX_LANES],
        pre_emphasis: &[DriveLevel; MAX_LANES],
    ) {
        self.calls.push(PhyCall::SetDrive(*swing, *pre_emphasis));
    }

    fn set_training_pattern(&mut self, pattern: TrainingPattern) {
        self.calls.push(PhyCall::SetTrainingPattern(pattern));
    }

    fn link_rate(&self) -> Option<LinkRate> {
        self.rate
    }

    fn lane_count(&self) -> Option<LaneCount> {
        self.lanes
    }
}

// =============================================================================
// PLATFORM
// =============================================================================

/// Platform with a shared unplug flag and a sleep log
#[derive(Debug)]
pub struct MockPlatform {
    unplugged: Rc<Cell<bool>>,
    unplug_at_poll: Option<u32>,
    polls: Cell<u32>,
    pipeline_active: bool,
    sleeps: RefCell<Vec<(u32, u32)>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            unplugged: Rc::new(Cell::new(false)),
            unplug_at_poll: None,
            polls: Cell::new(0),
            pipeline_active: false,
            sleeps: RefCell::new(Vec::new()),
        }
    }

    /// Raise the unplug flag on the n-th poll (1-based)
    pub fn unplug_at_poll(mut self, poll: u32) -> Self {
        self.unplug_at_poll = Some(poll);
        self
    }

    pub fn pipeline_active(mut self, active: bool) -> Self {
        self.pipeline_active = active;
        self
    }

    pub fn unplug_flag(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.unplugged)
    }

    pub fn polls(&self) -> u32 {
        self.polls.get()
    }

    pub fn sleeps(&self) -> Vec<(u32, u32)> {
        self.sleeps.borrow().clone()
    }
}

impl Platform for MockPlatform {
    fn is_unplugged(&self) -> bool {
        let polls = self.polls.get() + 1;
        self.polls.set(polls);
        if self.unplug_at_poll == Some(polls) {
            self.unplugged.set(true);
        }
        self.unplugged.get()
    }

    fn sleep_us(&self, min_us: u32, max_us: u32) {
        self.sleeps.borrow_mut().push((min_us, max_us));
    }

    fn is_pipeline_active(&self) -> bool {
        self.pipeline_active
    }
}
