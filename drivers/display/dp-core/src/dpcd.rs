//! # DPCD Register Map
//!
//! DisplayPort Configuration Data addresses and bit-exact codecs for the
//! registers touched by link training.
//!
//! ## Layout
//!
//! ```text
//! 0x000 ┌──────────────────────────────┐
//!       │ Receiver capability (16 B)   │  rev, max rate, max lanes, ...
//! 0x100 ├──────────────────────────────┤
//!       │ LINK_BW_SET, LANE_COUNT_SET  │
//!       │ TRAINING_PATTERN_SET         │
//!       │ TRAINING_LANE0..3_SET        │
//! 0x200 ├──────────────────────────────┤
//!       │ Status burst (6 B)           │  sink count .. sink status
//!       │ ADJUST_REQUEST_LANE0_1/2_3   │
//!       │ Automated test registers     │
//! 0x260 └──────────────────────────────┘
//! ```

use static_assertions::{const_assert, const_assert_eq};

use crate::types::{DriveLevel, LaneCount, LaneDrive, LinkRate, TrainingPattern, MAX_LANES};

// =============================================================================
// REGISTER ADDRESSES
// =============================================================================

/// DPCD register addresses
pub mod regs {
    //! DPCD address constants

    /// DPCD revision
    pub const DPCD_REV: u32 = 0x000;
    /// Maximum link rate code
    pub const MAX_LINK_RATE: u32 = 0x001;
    /// Maximum lane count, TPS3 and enhanced-frame capability
    pub const MAX_LANE_COUNT: u32 = 0x002;
    /// Maximum downspread, TPS4 capability
    pub const MAX_DOWNSPREAD: u32 = 0x003;
    /// Training AUX read interval
    pub const TRAINING_AUX_RD_INTERVAL: u32 = 0x00E;

    /// Link rate to train at
    pub const LINK_BW_SET: u32 = 0x100;
    /// Lane count and enhanced framing
    pub const LANE_COUNT_SET: u32 = 0x101;
    /// Training pattern and scrambling control
    pub const TRAINING_PATTERN_SET: u32 = 0x102;
    /// Lane 0 drive setting
    pub const TRAINING_LANE0_SET: u32 = 0x103;
    /// Lane 1 drive setting
    pub const TRAINING_LANE1_SET: u32 = 0x104;
    /// Lane 2 drive setting
    pub const TRAINING_LANE2_SET: u32 = 0x105;
    /// Lane 3 drive setting
    pub const TRAINING_LANE3_SET: u32 = 0x106;

    /// Sink count
    pub const SINK_COUNT: u32 = 0x200;
    /// Device service IRQ vector
    pub const DEVICE_SERVICE_IRQ_VECTOR: u32 = 0x201;
    /// Lane 0/1 CR, EQ and symbol-lock status
    pub const LANE0_1_STATUS: u32 = 0x202;
    /// Lane 2/3 CR, EQ and symbol-lock status
    pub const LANE2_3_STATUS: u32 = 0x203;
    /// Inter-lane alignment and status-updated flags
    pub const LANE_ALIGN_STATUS_UPDATED: u32 = 0x204;
    /// Sink status
    pub const SINK_STATUS: u32 = 0x205;
    /// Requested drive setting for lanes 0/1
    pub const ADJUST_REQUEST_LANE0_1: u32 = 0x206;
    /// Requested drive setting for lanes 2/3
    pub const ADJUST_REQUEST_LANE2_3: u32 = 0x207;

    /// Automated test request
    pub const TEST_REQUEST: u32 = 0x218;
    /// Link rate requested by the test
    pub const TEST_LINK_RATE: u32 = 0x219;
    /// Lane count requested by the test
    pub const TEST_LANE_COUNT: u32 = 0x220;
    /// PHY compliance pattern requested by the test
    pub const PHY_TEST_PATTERN: u32 = 0x248;
    /// Source response to a test request
    pub const TEST_RESPONSE: u32 = 0x260;
}

/// Receiver capability burst length
pub const CAPABILITY_LEN: usize = 16;
/// Full status burst length (`SINK_COUNT..SINK_STATUS`)
pub const STATUS_LEN: usize = 6;
/// Lane status bytes read during clock recovery
pub const LANE_STATUS_LEN: usize = 2;
/// Lane status plus alignment bytes read during equalization
pub const LANE_ALIGN_STATUS_LEN: usize = 3;
/// Adjust request burst length
pub const ADJUST_REQUEST_LEN: usize = 2;

const_assert_eq!(regs::TRAINING_LANE0_SET + 3, regs::TRAINING_LANE3_SET);
const_assert_eq!(regs::LINK_BW_SET + 1, regs::LANE_COUNT_SET);
const_assert_eq!(regs::SINK_COUNT + STATUS_LEN as u32, regs::ADJUST_REQUEST_LANE0_1);
const_assert_eq!(
    regs::LANE0_1_STATUS + LANE_ALIGN_STATUS_LEN as u32,
    regs::SINK_STATUS
);
const_assert!((regs::TRAINING_AUX_RD_INTERVAL as usize) < CAPABILITY_LEN);

// =============================================================================
// CAPABILITY FIELDS
// =============================================================================

/// `MAX_LANE_COUNT` lane count field
pub const MAX_LANE_COUNT_MASK: u8 = 0x1F;
/// `MAX_LANE_COUNT` TPS3 supported bit
pub const TPS3_SUPPORTED: u8 = 1 << 6;
/// `MAX_LANE_COUNT` / `LANE_COUNT_SET` enhanced framing bit
pub const ENHANCED_FRAME_CAP: u8 = 1 << 7;
/// `MAX_DOWNSPREAD` TPS4 supported bit
pub const TPS4_SUPPORTED: u8 = 1 << 7;
/// `TRAINING_AUX_RD_INTERVAL` interval field
pub const AUX_RD_INTERVAL_MASK: u8 = 0x7F;

/// Receiver capabilities relevant to link training
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SinkCapabilities {
    /// DPCD revision (major in high nibble)
    pub revision: u8,
    /// Raw `MAX_LINK_RATE` code
    pub max_link_rate_code: u8,
    /// Raw lane count field of `MAX_LANE_COUNT`
    pub max_lane_count: u8,
    /// Sink supports TPS3
    pub tps3_supported: bool,
    /// Sink supports TPS4
    pub tps4_supported: bool,
    /// Sink supports enhanced framing
    pub enhanced_frame: bool,
    /// `TRAINING_AUX_RD_INTERVAL`, in 4 ms units (0 means 100 µs)
    pub aux_rd_interval: u8,
}

impl SinkCapabilities {
    /// Decode the receiver capability burst
    pub fn parse(raw: &[u8; CAPABILITY_LEN]) -> Self {
        let lanes = raw[regs::MAX_LANE_COUNT as usize];
        Self {
            revision: raw[regs::DPCD_REV as usize],
            max_link_rate_code: raw[regs::MAX_LINK_RATE as usize],
            max_lane_count: lanes & MAX_LANE_COUNT_MASK,
            tps3_supported: lanes & TPS3_SUPPORTED != 0,
            tps4_supported: raw[regs::MAX_DOWNSPREAD as usize] & TPS4_SUPPORTED != 0,
            enhanced_frame: lanes & ENHANCED_FRAME_CAP != 0,
            aux_rd_interval: raw[regs::TRAINING_AUX_RD_INTERVAL as usize] & AUX_RD_INTERVAL_MASK,
        }
    }

    /// Highest legal link rate the sink advertises
    pub fn max_link_rate(&self) -> Option<LinkRate> {
        LinkRate::floor_code(self.max_link_rate_code)
    }

    /// Highest legal lane count the sink advertises
    pub fn max_lanes(&self) -> Option<LaneCount> {
        LaneCount::floor_count(self.max_lane_count)
    }
}

// =============================================================================
// LINK CONFIGURATION
// =============================================================================

/// `LINK_BW_SET` / `LANE_COUNT_SET` burst
pub fn link_config_bytes(rate: LinkRate, lanes: LaneCount, enhanced_frame: bool) -> [u8; 2] {
    let mut lane_byte = lanes.count();
    if enhanced_frame {
        lane_byte |= ENHANCED_FRAME_CAP;
    }
    [rate.code(), lane_byte]
}

/// `TRAINING_PATTERN_SET` scrambling-disable bit
pub const SCRAMBLING_DISABLE: u8 = 1 << 5;

/// `TRAINING_PATTERN_SET` value for a pattern
///
/// TPS1..3 go out unscrambled; TPS4 and normal data are scrambled.
pub const fn training_pattern_set(pattern: TrainingPattern) -> u8 {
    let select = match pattern {
        TrainingPattern::Normal => 0x00,
        TrainingPattern::Pattern1 => 0x01,
        TrainingPattern::Pattern2 => 0x02,
        TrainingPattern::Pattern3 => 0x03,
        TrainingPattern::Pattern4 => 0x07,
    };
    if pattern.scrambling_disabled() {
        select | SCRAMBLING_DISABLE
    } else {
        select
    }
}

// =============================================================================
// LANE SET
// =============================================================================

/// `TRAINING_LANEx_SET` max-pre-emphasis-reached bit
pub const MAX_PRE_EMPHASIS_REACHED: u8 = 1 << 2;
/// `TRAINING_LANEx_SET` pre-emphasis field shift
pub const PRE_EMPHASIS_SHIFT: u8 = 3;
/// `TRAINING_LANEx_SET` max-swing-reached bit
pub const MAX_SWING_REACHED: u8 = 1 << 5;

/// One `TRAINING_LANEx_SET` byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LaneSet {
    /// Drive setting being transmitted
    pub drive: LaneDrive,
    /// Swing has been held long enough to count as maxed out
    pub max_swing_reached: bool,
    /// Pre-emphasis has been held long enough to count as maxed out
    pub max_pre_emphasis_reached: bool,
}

impl LaneSet {
    /// Encode as `(pre_emphasis << 3) | swing | max-reached bits`
    pub const fn encode(&self) -> u8 {
        let mut byte =
            (self.drive.pre_emphasis.bits() << PRE_EMPHASIS_SHIFT) | self.drive.swing.bits();
        if self.max_pre_emphasis_reached {
            byte |= MAX_PRE_EMPHASIS_REACHED;
        }
        if self.max_swing_reached {
            byte |= MAX_SWING_REACHED;
        }
        byte
    }

    /// Decode a lane-set byte
    pub const fn decode(byte: u8) -> Self {
        Self {
            drive: LaneDrive::new(
                DriveLevel::from_bits(byte),
                DriveLevel::from_bits(byte >> PRE_EMPHASIS_SHIFT),
            ),
            max_swing_reached: byte & MAX_SWING_REACHED != 0,
            max_pre_emphasis_reached: byte & MAX_PRE_EMPHASIS_REACHED != 0,
        }
    }
}

// =============================================================================
// LANE STATUS
// =============================================================================

bitflags::bitflags! {
    /// Per-lane status nibble of `LANE0_1_STATUS` / `LANE2_3_STATUS`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LaneStatus: u8 {
        /// Clock recovery done
        const CR_DONE = 1 << 0;
        /// Channel equalization done
        const CHANNEL_EQ_DONE = 1 << 1;
        /// Symbol locked
        const SYMBOL_LOCKED = 1 << 2;
    }
}

bitflags::bitflags! {
    /// `LANE_ALIGN_STATUS_UPDATED` flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AlignStatus: u8 {
        /// All active lanes aligned
        const INTERLANE_ALIGN_DONE = 1 << 0;
        /// Downstream port status changed
        const DOWNSTREAM_PORT_STATUS_CHANGED = 1 << 6;
        /// Link status was updated since the last read
        const LINK_STATUS_UPDATED = 1 << 7;
    }
}

impl LaneStatus {
    /// CR done, channel EQ done and symbol locked
    pub const LOCKED: Self = Self::all();
}

/// Decoded lane status and alignment bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LaneAlignStatus {
    /// Per-lane status
    pub lanes: [LaneStatus; MAX_LANES],
    /// Alignment flags
    pub align: AlignStatus,
}

impl LaneAlignStatus {
    /// Decode from the two lane-status bytes and the alignment byte
    ///
    /// The even lane of each pair sits in bits 0..2, the odd lane in bits 4..6.
    pub fn from_bytes(lane0_1: u8, lane2_3: u8, align: u8) -> Self {
        Self {
            lanes: [
                LaneStatus::from_bits_truncate(lane0_1),
                LaneStatus::from_bits_truncate(lane0_1 >> 4),
                LaneStatus::from_bits_truncate(lane2_3),
                LaneStatus::from_bits_truncate(lane2_3 >> 4),
            ],
            align: AlignStatus::from_bits_truncate(align),
        }
    }

    /// Decode a 2- or 3-byte burst starting at `LANE0_1_STATUS`
    pub fn from_burst(raw: &[u8]) -> Self {
        let byte = |i: usize| raw.get(i).copied().unwrap_or(0);
        Self::from_bytes(byte(0), byte(1), byte(2))
    }

    /// Status of one lane
    pub fn lane(&self, lane: usize) -> LaneStatus {
        self.lanes[lane]
    }

    fn mask_of(&self, flag: LaneStatus) -> u8 {
        self.lanes
            .iter()
            .enumerate()
            .filter(|(_, status)| status.contains(flag))
            .fold(0, |mask, (i, _)| mask | (1 << i))
    }

    /// Bit per lane with CR done
    pub fn cr_done_mask(&self) -> u8 {
        self.mask_of(LaneStatus::CR_DONE)
    }

    /// Bit per lane with channel EQ done
    pub fn eq_done_mask(&self) -> u8 {
        self.mask_of(LaneStatus::CHANNEL_EQ_DONE)
    }

    /// Bit per lane with symbol lock
    pub fn symbol_locked_mask(&self) -> u8 {
        self.mask_of(LaneStatus::SYMBOL_LOCKED)
    }

    /// Every active lane has recovered its clock
    pub fn clock_recovered(&self, lanes: LaneCount) -> bool {
        self.cr_done_mask() & lanes.mask() == lanes.mask()
    }

    /// Every active lane is equalized and symbol locked
    pub fn channel_equalized(&self, lanes: LaneCount) -> bool {
        let mask = lanes.mask();
        self.eq_done_mask() & mask == mask && self.symbol_locked_mask() & mask == mask
    }

    /// Inter-lane alignment is done
    pub fn interlane_aligned(&self) -> bool {
        self.align.contains(AlignStatus::INTERLANE_ALIGN_DONE)
    }

    /// Sink flagged a link status change
    pub fn link_status_updated(&self) -> bool {
        self.align.contains(AlignStatus::LINK_STATUS_UPDATED)
    }

    /// First active lane missing any of CR, EQ or symbol lock
    pub fn first_unlocked_lane(&self, lanes: LaneCount) -> Option<u8> {
        (0..lanes.lanes())
            .find(|&lane| !self.lanes[lane].contains(LaneStatus::LOCKED))
            .map(|lane| lane as u8)
    }
}

// =============================================================================
// STATUS BURST
// =============================================================================

bitflags::bitflags! {
    /// `DEVICE_SERVICE_IRQ_VECTOR` flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IrqVector: u8 {
        /// Remote control command pending
        const REMOTE_CONTROL_COMMAND = 1 << 0;
        /// Automated test requested
        const AUTOMATED_TEST_REQUEST = 1 << 1;
        /// Content protection IRQ
        const CP_IRQ = 1 << 2;
        /// MCCS IRQ
        const MCCS_IRQ = 1 << 3;
        /// Sideband down reply ready
        const DOWN_REP_MSG_RDY = 1 << 4;
        /// Sideband up request ready
        const UP_REQ_MSG_RDY = 1 << 5;
        /// Vendor-specific IRQ
        const SINK_SPECIFIC_IRQ = 1 << 6;
    }
}

/// Decoded `SINK_COUNT..SINK_STATUS` burst
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkStatus {
    /// Number of sinks behind this receiver
    pub sink_count: u8,
    /// Pending service IRQs
    pub irq_vector: IrqVector,
    /// Lane and alignment status
    pub lanes: LaneAlignStatus,
    /// Raw `SINK_STATUS`
    pub sink_status: u8,
}

impl LinkStatus {
    /// Decode the 6-byte status burst
    pub fn parse(raw: &[u8; STATUS_LEN]) -> Self {
        Self {
            sink_count: sink_count(raw[0]),
            irq_vector: IrqVector::from_bits_truncate(raw[1]),
            lanes: LaneAlignStatus::from_bytes(raw[2], raw[3], raw[4]),
            sink_status: raw[5],
        }
    }

    /// A burst of all ones means the sink is not answering
    pub fn is_all_ones(raw: &[u8; STATUS_LEN]) -> bool {
        raw.iter().fold(0xFF, |acc, b| acc & b) == 0xFF
    }
}

/// Decode `SINK_COUNT`: bits 5..0 plus bit 7 as bit 6
pub const fn sink_count(byte: u8) -> u8 {
    (byte & 0x3F) | ((byte & 0x80) >> 1)
}

// =============================================================================
// ADJUST REQUEST
// =============================================================================

/// Drive settings requested by the sink through `ADJUST_REQUEST_LANEx_y`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdjustRequest {
    /// Requested setting per lane
    pub lanes: [LaneDrive; MAX_LANES],
}

impl AdjustRequest {
    /// Decode the two adjust-request bytes
    ///
    /// Even lane: swing bits 1..0, pre-emphasis bits 3..2.
    /// Odd lane: swing bits 5..4, pre-emphasis bits 7..6.
    pub fn parse(raw: &[u8; ADJUST_REQUEST_LEN]) -> Self {
        let pair = |byte: u8| {
            [
                LaneDrive::new(DriveLevel::from_bits(byte), DriveLevel::from_bits(byte >> 2)),
                LaneDrive::new(
                    DriveLevel::from_bits(byte >> 4),
                    DriveLevel::from_bits(byte >> 6),
                ),
            ]
        };
        let [l0, l1] = pair(raw[0]);
        let [l2, l3] = pair(raw[1]);
        Self {
            lanes: [l0, l1, l2, l3],
        }
    }

    /// Encode back into the two register bytes
    pub fn to_bytes(&self) -> [u8; ADJUST_REQUEST_LEN] {
        let pair = |even: LaneDrive, odd: LaneDrive| {
            even.swing.bits()
                | (even.pre_emphasis.bits() << 2)
                | (odd.swing.bits() << 4)
                | (odd.pre_emphasis.bits() << 6)
        };
        [
            pair(self.lanes[0], self.lanes[1]),
            pair(self.lanes[2], self.lanes[3]),
        ]
    }

    /// Requested swing equals `current` on every active lane
    pub fn same_swing(&self, current: &[LaneDrive; MAX_LANES], lanes: LaneCount) -> bool {
        (0..lanes.lanes()).all(|lane| self.lanes[lane].swing == current[lane].swing)
    }
}

// =============================================================================
// AUTOMATED TEST
// =============================================================================

bitflags::bitflags! {
    /// `TEST_REQUEST` flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TestRequest: u8 {
        /// Retrain at `TEST_LINK_RATE` x `TEST_LANE_COUNT`
        const LINK_TRAINING = 1 << 0;
        /// Send a video test pattern
        const VIDEO_PATTERN = 1 << 1;
        /// Read EDID and report its checksum
        const EDID_READ = 1 << 2;
        /// Send a PHY compliance pattern
        const PHY_TEST_PATTERN = 1 << 3;
        /// FAUX test pattern
        const FAUX_TEST_PATTERN = 1 << 4;
        /// Send an audio test pattern
        const AUDIO_PATTERN = 1 << 5;
        /// Audio without video
        const AUDIO_DISABLED_VIDEO = 1 << 6;
    }
}

/// `TEST_RESPONSE` acknowledge
pub const TEST_ACK: u8 = 1 << 0;
/// `TEST_RESPONSE` negative acknowledge
pub const TEST_NAK: u8 = 1 << 1;
/// `TEST_LANE_COUNT` lane count field
pub const TEST_LANE_COUNT_MASK: u8 = 0x1F;

// =============================================================================
// TESTS
// =============================================================================
