//! Predefined data formats for the standard device reports.
//!
//! Each format is compiled from a static table of `(identifier, offset,
//! type, options)` rows; repeated runs (buttons, keys) are expanded from a
//! single row template.
//!
//! | Name        | Report | Objects | Identifiers |
//! |-------------|--------|---------|-------------|
//! | `mouse`     | 16 B   | 7       | 3           |
//! | `mouse2`    | 20 B   | 11      | 3           |
//! | `keyboard`  | 256 B  | 256     | 256         |
//! | `joystick`  | 80 B   | 44      | 12          |
//! | `joystick2` | 272 B  | 164     | 36          |

use uuid::{uuid, Uuid};

use super::{
    DataFormatFlags, DeviceReportDescriptor, ObjectFormatEntry, ObjectOptions, ObjectType,
};

pub const GUID_X_AXIS:  Uuid = uuid!("a36d02e0-c9f3-11cf-bfc7-444553540000");
pub const GUID_Y_AXIS:  Uuid = uuid!("a36d02e1-c9f3-11cf-bfc7-444553540000");
pub const GUID_Z_AXIS:  Uuid = uuid!("a36d02e2-c9f3-11cf-bfc7-444553540000");
pub const GUID_RX_AXIS: Uuid = uuid!("a36d02f4-c9f3-11cf-bfc7-444553540000");
pub const GUID_RY_AXIS: Uuid = uuid!("a36d02f5-c9f3-11cf-bfc7-444553540000");
pub const GUID_RZ_AXIS: Uuid = uuid!("a36d02e3-c9f3-11cf-bfc7-444553540000");
pub const GUID_SLIDER:  Uuid = uuid!("a36d02e4-c9f3-11cf-bfc7-444553540000");
pub const GUID_BUTTON:  Uuid = uuid!("a36d02f0-c9f3-11cf-bfc7-444553540000");
pub const GUID_KEY:     Uuid = uuid!("55728220-d33c-11cf-bfc7-444553540000");
pub const GUID_POV:     Uuid = uuid!("a36d02f2-c9f3-11cf-bfc7-444553540000");

/// Standard report shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardFormat {
    Mouse,
    Mouse2,
    Keyboard,
    Joystick,
    Joystick2,
}

impl StandardFormat {
    pub const ALL: [StandardFormat; 5] = [
        StandardFormat::Mouse,
        StandardFormat::Mouse2,
        StandardFormat::Keyboard,
        StandardFormat::Joystick,
        StandardFormat::Joystick2,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StandardFormat::Mouse     => "mouse",
            StandardFormat::Mouse2    => "mouse2",
            StandardFormat::Keyboard  => "keyboard",
            StandardFormat::Joystick  => "joystick",
            StandardFormat::Joystick2 => "joystick2",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mouse"     => Some(StandardFormat::Mouse),
            "mouse2"    => Some(StandardFormat::Mouse2),
            "keyboard"  => Some(StandardFormat::Keyboard),
            "joystick"  => Some(StandardFormat::Joystick),
            "joystick2" => Some(StandardFormat::Joystick2),
            _           => None,
        }
    }

    pub fn descriptor(self) -> DeviceReportDescriptor {
        match self {
            StandardFormat::Mouse     => mouse(),
            StandardFormat::Mouse2    => mouse2(),
            StandardFormat::Keyboard  => keyboard(),
            StandardFormat::Joystick  => joystick(),
            StandardFormat::Joystick2 => joystick2(),
        }
    }
}

/// One table row.  `repeat` expands into consecutive controls `stride`
/// bytes apart.
struct Row {
    guid:    Option<Uuid>,
    offset:  u32,
    ty:      ObjectType,
    options: ObjectOptions,
    repeat:  u32,
    stride:  u32,
}

const fn row(guid: Option<Uuid>, offset: u32, ty: ObjectType) -> Row {
    Row { guid, offset, ty, options: ObjectOptions::empty(), repeat: 1, stride: 0 }
}

const OPT: ObjectType = ObjectType::OPTIONAL;

const fn or(a: ObjectType, b: ObjectType) -> ObjectType {
    ObjectType::from_bits_retain(a.bits() | b.bits())
}

/// Optional axis reporting one aspect (position, velocity, ...).
const fn axis(guid: Uuid, offset: u32, aspect: ObjectOptions) -> Row {
    Row { options: aspect, ..row(Some(guid), offset, or(ObjectType::AXIS, OPT)) }
}

/// Run of `count` optional button bytes.
const fn buttons(offset: u32, count: u32) -> Row {
    Row { repeat: count, stride: 1, ..row(None, offset, or(ObjectType::BUTTON, OPT)) }
}

/// Mouse report: three relative axes then four button bytes (16 bytes).
static MOUSE: &[Row] = &[
    row(Some(GUID_X_AXIS), 0, ObjectType::AXIS),
    row(Some(GUID_Y_AXIS), 4, ObjectType::AXIS),
    row(Some(GUID_Z_AXIS), 8, or(ObjectType::AXIS, OPT)),
    Row { repeat: 2, stride: 1, ..row(None, 12, ObjectType::BUTTON) },
    buttons(14, 2),
];

/// Extended mouse report: as [`MOUSE`] with eight buttons (20 bytes).
static MOUSE2: &[Row] = &[
    row(Some(GUID_X_AXIS), 0, ObjectType::AXIS),
    row(Some(GUID_Y_AXIS), 4, ObjectType::AXIS),
    row(Some(GUID_Z_AXIS), 8, or(ObjectType::AXIS, OPT)),
    Row { repeat: 2, stride: 1, ..row(None, 12, ObjectType::BUTTON) },
    buttons(14, 6),
];

const POS: ObjectOptions = ObjectOptions::ASPECT_POSITION;

/// Six axes, two sliders and four POV hats shared by both joystick
/// reports (48 bytes).
static JOYSTICK_AXES: &[Row] = &[
    axis(GUID_X_AXIS,  0,  POS),
    axis(GUID_Y_AXIS,  4,  POS),
    axis(GUID_Z_AXIS,  8,  POS),
    axis(GUID_RX_AXIS, 12, POS),
    axis(GUID_RY_AXIS, 16, POS),
    axis(GUID_RZ_AXIS, 20, POS),
    Row { repeat: 2, stride: 4, ..axis(GUID_SLIDER, 24, POS) },
    Row { repeat: 4, stride: 4, ..row(Some(GUID_POV), 32, or(ObjectType::POV, OPT)) },
];

/// Joystick report: shared axes then 32 button bytes (80 bytes).
static JOYSTICK: &[Row] = &[buttons(48, 32)];

const VEL: ObjectOptions = ObjectOptions::ASPECT_VELOCITY;
const ACC: ObjectOptions = ObjectOptions::ASPECT_ACCEL;
const FRC: ObjectOptions = ObjectOptions::ASPECT_FORCE;

/// Extended joystick report: shared axes, 128 button bytes, then velocity,
/// acceleration and force blocks of six axes and two sliders each
/// (272 bytes).
static JOYSTICK2: &[Row] = &[
    buttons(48, 128),
    axis(GUID_X_AXIS,  176, VEL),
    axis(GUID_Y_AXIS,  180, VEL),
    axis(GUID_Z_AXIS,  184, VEL),
    axis(GUID_RX_AXIS, 188, VEL),
    axis(GUID_RY_AXIS, 192, VEL),
    axis(GUID_RZ_AXIS, 196, VEL),
    Row { repeat: 2, stride: 4, ..axis(GUID_SLIDER, 200, VEL) },
    axis(GUID_X_AXIS,  208, ACC),
    axis(GUID_Y_AXIS,  212, ACC),
    axis(GUID_Z_AXIS,  216, ACC),
    axis(GUID_RX_AXIS, 220, ACC),
    axis(GUID_RY_AXIS, 224, ACC),
    axis(GUID_RZ_AXIS, 228, ACC),
    Row { repeat: 2, stride: 4, ..axis(GUID_SLIDER, 232, ACC) },
    axis(GUID_X_AXIS,  240, FRC),
    axis(GUID_Y_AXIS,  244, FRC),
    axis(GUID_Z_AXIS,  248, FRC),
    axis(GUID_RX_AXIS, 252, FRC),
    axis(GUID_RY_AXIS, 256, FRC),
    axis(GUID_RZ_AXIS, 260, FRC),
    Row { repeat: 2, stride: 4, ..axis(GUID_SLIDER, 264, FRC) },
];

fn expand(tables: &[&[Row]]) -> Vec<ObjectFormatEntry> {
    tables.iter()
        .flat_map(|rows| rows.iter())
        .flat_map(|r| {
            (0..r.repeat).map(move |i| {
                ObjectFormatEntry::new(r.guid, r.offset + i * r.stride, r.ty)
                    .with_options(r.options)
            })
        })
        .collect()
}

pub fn mouse() -> DeviceReportDescriptor {
    DeviceReportDescriptor {
        flags:       DataFormatFlags::RELATIVE_AXIS,
        report_size: 16,
        objects:     expand(&[MOUSE]),
    }
}

pub fn mouse2() -> DeviceReportDescriptor {
    DeviceReportDescriptor {
        flags:       DataFormatFlags::RELATIVE_AXIS,
        report_size: 20,
        objects:     expand(&[MOUSE2]),
    }
}

pub fn joystick() -> DeviceReportDescriptor {
    DeviceReportDescriptor {
        flags:       DataFormatFlags::ABSOLUTE_AXIS,
        report_size: 80,
        objects:     expand(&[JOYSTICK_AXES, JOYSTICK]),
    }
}

pub fn joystick2() -> DeviceReportDescriptor {
    DeviceReportDescriptor {
        flags:       DataFormatFlags::ABSOLUTE_AXIS,
        report_size: 272,
        objects:     expand(&[JOYSTICK_AXES, JOYSTICK2]),
    }
}

/// Keyboard report: one byte per scan code, instance = scan code.
pub fn keyboard() -> DeviceReportDescriptor {
    let objects = (0u16..256)
        .map(|code| {
            ObjectFormatEntry::new(Some(GUID_KEY), code as u32, or(ObjectType::BUTTON, OPT))
                .with_instance(code as i16)
        })
        .collect();
    DeviceReportDescriptor {
        flags:       DataFormatFlags::RELATIVE_AXIS,
        report_size: 256,
        objects,
    }
}
