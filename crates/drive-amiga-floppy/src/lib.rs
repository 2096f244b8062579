//! Amiga floppy drive mechanism emulator.
//!
//! Emulates the physical drive: head positioning, motor control, disk
//! change detection, drive identification, and rotation of the raw bit
//! stream under the head. Control signals come from CIA-B port B; status
//! signals feed back to CIA-A port A.

mod controller;
mod image;

pub use controller::{DiskController, DmaState, LineEvents};
pub use image::DiskImage;

use format_asf::{ByteReader, ByteWriter, Snapshottable, StateError};
use log::warn;

/// E-clock ticks for motor spin-up (~500ms at 709 kHz).
pub const MOTOR_SPINUP_TICKS: u32 = 350_000;

/// Raw bytes per track on a double-density disk.
pub const TRACK_BYTES: u32 = 12_668;
/// Bits per revolution.
pub const TRACK_BITS: u32 = TRACK_BYTES * 8;

/// Standard 3.5" double-density drive identification word.
pub const DRIVE_ID_35DD: u32 = 0xFFFF_FFFF;

const MAX_CYLINDER: u32 = 79;

/// Fixed part of a `DSKn` payload, before the image name.
const STATE_FIXED_LEN: usize = 4 + 1 + 1 + 1 + 1 + 4 + 4;

/// Drive status bits for CIA-A PRA (active-low: 0 = asserted).
pub struct DriveStatus {
    /// PA2: /DSKCHANGE, low when disk has been removed since last step.
    pub disk_change: bool,
    /// PA3: /DSKPROT, low when disk is write-protected.
    pub write_protect: bool,
    /// PA4: /DSKTRACK0, low when head is at cylinder 0.
    pub track0: bool,
    /// PA5: /DSKRDY, low when motor is at speed (or the current ID bit is 1
    /// while the motor is off).
    pub ready: bool,
}

pub struct AmigaFloppyDrive {
    disk: Option<DiskImage>,
    drive_id: u32,
    disabled: bool,
    cylinder: u32,
    head: u32,
    motor_on: bool,
    motor_spinning: bool,
    spin_timer: u32,
    selected: bool,
    disk_changed: bool,
    prev_step: bool,
    /// Which drive-ID bit the next deselected motor-off poll returns.
    id_mode: u8,
    /// Bit offset of the head from the start of the track.
    bit_pos: u32,
    /// Set when a restored snapshot named a different image than the one
    /// inserted.
    image_mismatch: bool,
}

impl AmigaFloppyDrive {
    #[must_use]
    pub fn new() -> Self {
        Self {
            disk: None,
            drive_id: DRIVE_ID_35DD,
            disabled: false,
            cylinder: 0,
            head: 0,
            motor_on: false,
            motor_spinning: false,
            spin_timer: 0,
            selected: false,
            disk_changed: true, // No disk at power-on
            prev_step: true,    // Active-low: idle = high
            id_mode: 0,
            bit_pos: 0,
            image_mismatch: false,
        }
    }

    /// A drive slot with nothing connected. It produces no snapshot chunk.
    #[must_use]
    pub fn disconnected() -> Self {
        Self {
            disabled: true,
            drive_id: 0,
            ..Self::new()
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.disabled
    }

    pub fn insert_disk(&mut self, image: DiskImage) {
        self.disk = Some(image);
        self.disk_changed = false;
        self.image_mismatch = false;
    }

    pub fn eject_disk(&mut self) -> Option<DiskImage> {
        self.disk_changed = true;
        self.disk.take()
    }

    /// Update control signals from CIA-B PRB.
    /// All active-low: the boolean parameters are true when the signal
    /// is asserted (pin driven low).
    pub fn update_control(
        &mut self,
        step: bool,
        dir_inward: bool,
        side_upper: bool,
        sel: bool,
        motor: bool,
    ) {
        if self.disabled {
            return;
        }

        // Select latches the motor line. Each select with the motor off
        // shifts the next ID bit onto /DSKRDY.
        if sel {
            if !self.selected && !self.motor_on && !motor {
                self.id_mode = (self.id_mode + 1) & 31;
            }
            self.selected = true;
            if motor && !self.motor_on {
                self.id_mode = 0;
                self.spin_timer = 0;
            }
            self.motor_on = motor;
            if !motor {
                self.motor_spinning = false;
                self.spin_timer = 0;
            }
        } else {
            self.selected = false;
        }

        self.head = u32::from(side_upper);

        // Step on falling edge
        let step_edge = step && !self.prev_step;
        self.prev_step = step;

        if step_edge && self.selected {
            if dir_inward {
                if self.cylinder < MAX_CYLINDER {
                    self.cylinder += 1;
                }
            } else if self.cylinder > 0 {
                self.cylinder -= 1;
            }
            if self.disk.is_some() {
                self.disk_changed = false;
            }
        }
    }

    /// Advance the motor spin-up timer by `eclocks` E-clock ticks.
    pub fn advance_eclocks(&mut self, eclocks: u32) {
        if self.motor_on && !self.motor_spinning {
            self.spin_timer = self.spin_timer.saturating_add(eclocks);
            if self.spin_timer >= MOTOR_SPINUP_TICKS {
                self.motor_spinning = true;
            }
        }
    }

    /// Read the bit under the head and rotate by one bit cell. A stopped
    /// motor leaves the disk where it is.
    pub fn next_bit(&mut self) -> u8 {
        if !self.motor_on {
            return 0;
        }
        let track = self.cylinder * 2 + self.head;
        let bit = self
            .disk
            .as_ref()
            .map_or(0, |d| d.bit(track, self.bit_pos, TRACK_BYTES));
        self.bit_pos = (self.bit_pos + 1) % TRACK_BITS;
        bit
    }

    /// Current drive status for CIA-A PRA input.
    #[must_use]
    pub fn status(&self) -> DriveStatus {
        let ready = if self.motor_on {
            self.motor_spinning
        } else {
            (self.drive_id >> (31 - u32::from(self.id_mode))) & 1 != 0
        };
        DriveStatus {
            disk_change: self.disk_changed,
            write_protect: false,
            track0: self.cylinder == 0,
            ready,
        }
    }

    #[must_use]
    pub fn has_disk(&self) -> bool {
        self.disk.is_some()
    }

    #[must_use]
    pub fn disk(&self) -> Option<&DiskImage> {
        self.disk.as_ref()
    }

    #[must_use]
    pub fn cylinder(&self) -> u32 {
        self.cylinder
    }

    #[must_use]
    pub fn head(&self) -> u32 {
        self.head
    }

    #[must_use]
    pub fn motor_on(&self) -> bool {
        self.motor_on
    }

    #[must_use]
    pub fn selected(&self) -> bool {
        self.selected
    }

    #[must_use]
    pub fn bit_pos(&self) -> u32 {
        self.bit_pos
    }

    #[must_use]
    pub fn image_mismatch(&self) -> bool {
        self.image_mismatch
    }

    fn image_name(&self) -> &str {
        self.disk.as_ref().map_or("", DiskImage::name)
    }
}

impl Default for AmigaFloppyDrive {
    fn default() -> Self {
        Self::new()
    }
}

impl Snapshottable for AmigaFloppyDrive {
    fn state_size(&self) -> Option<usize> {
        if self.disabled {
            return None;
        }
        let name = self.image_name();
        let name_len = name.bytes().position(|b| b == 0).unwrap_or(name.len());
        Some(STATE_FIXED_LEN + name_len + 1)
    }

    fn save_state(&self, w: &mut ByteWriter<'_>) {
        w.write_u32(self.drive_id);
        w.write_u8(u8::from(self.motor_on) | (u8::from(self.disabled) << 1));
        w.write_u8(self.cylinder as u8);
        w.write_bool(self.motor_spinning);
        w.write_u8(self.id_mode);
        w.write_u32(self.bit_pos);
        w.write_u32(self.disk.as_ref().map_or(0, DiskImage::crc32));
        w.write_string(self.image_name());
    }

    fn restore_state(&mut self, r: &mut ByteReader<'_>) -> Result<(), StateError> {
        if r.remaining() < STATE_FIXED_LEN {
            return Err(StateError::Truncated {
                needed: STATE_FIXED_LEN,
                available: r.remaining(),
            });
        }
        self.drive_id = r.read_u32();
        let state = r.read_u8();
        self.motor_on = state & 0x01 != 0;
        self.disabled = state & 0x02 != 0;
        let track = r.read_u8();
        if u32::from(track) > MAX_CYLINDER {
            return Err(StateError::Unsupported {
                what: "drive cylinder",
                value: u32::from(track),
            });
        }
        self.cylinder = u32::from(track);
        self.motor_spinning = r.read_bool();
        self.spin_timer = if self.motor_spinning {
            MOTOR_SPINUP_TICKS
        } else {
            0
        };
        self.id_mode = r.read_u8() & 31;
        self.bit_pos = r.read_u32() % TRACK_BITS;
        let crc = r.read_u32();
        let name = r.read_string();

        let (have_name, have_crc) = self
            .disk
            .as_ref()
            .map_or(("", 0), |d| (d.name(), d.crc32()));
        self.image_mismatch = have_name != name || have_crc != crc;
        if self.image_mismatch {
            warn!(
                "floppy: snapshot expects '{name}' (crc {crc:08X}), drive holds '{have_name}' (crc {have_crc:08X})"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use format_asf::save_to_vec;

    fn step(drive: &mut AmigaFloppyDrive, inward: bool) {
        drive.update_control(false, inward, false, true, true);
        drive.update_control(true, inward, false, true, true);
    }

    fn image(name: &str, fill: u8) -> DiskImage {
        DiskImage::new(name, vec![fill; 901_120])
    }

    #[test]
    fn step_toward_center() {
        let mut drive = AmigaFloppyDrive::new();
        assert_eq!(drive.cylinder(), 0);
        step(&mut drive, true);
        assert_eq!(drive.cylinder(), 1);
    }

    #[test]
    fn step_toward_edge() {
        let mut drive = AmigaFloppyDrive::new();
        step(&mut drive, true);
        step(&mut drive, true);
        assert_eq!(drive.cylinder(), 2);
        step(&mut drive, false);
        assert_eq!(drive.cylinder(), 1);
    }

    #[test]
    fn head_stays_within_cylinders() {
        let mut drive = AmigaFloppyDrive::new();
        step(&mut drive, false);
        assert_eq!(drive.cylinder(), 0);
        for _ in 0..100 {
            step(&mut drive, true);
        }
        assert_eq!(drive.cylinder(), MAX_CYLINDER);
    }

    #[test]
    fn unselected_drive_ignores_step() {
        let mut drive = AmigaFloppyDrive::new();
        drive.update_control(false, true, false, false, false);
        drive.update_control(true, true, false, false, false);
        assert_eq!(drive.cylinder(), 0);
    }

    #[test]
    fn motor_spinup() {
        let mut drive = AmigaFloppyDrive::new();
        drive.update_control(false, false, false, true, true);
        assert!(!drive.status().ready);
        drive.advance_eclocks(MOTOR_SPINUP_TICKS - 1);
        assert!(!drive.status().ready);
        drive.advance_eclocks(1);
        assert!(drive.status().ready);
    }

    #[test]
    fn drive_id_shifts_out_while_motor_off() {
        let mut drive = AmigaFloppyDrive::new();
        for _ in 0..32 {
            drive.update_control(false, false, false, false, false);
            drive.update_control(false, false, false, true, false);
            assert!(drive.status().ready, "3.5\" DD reports all ones");
        }
    }

    #[test]
    fn disk_change_cleared_by_step() {
        let mut drive = AmigaFloppyDrive::new();
        drive.insert_disk(image("a.adf", 0));
        assert!(!drive.status().disk_change);
        drive.eject_disk();
        assert!(drive.status().disk_change);
        drive.insert_disk(image("b.adf", 0));
        step(&mut drive, true);
        assert!(!drive.status().disk_change);
    }

    #[test]
    fn rotation_wraps_at_track_end() {
        let mut drive = AmigaFloppyDrive::new();
        drive.insert_disk(image("ones.adf", 0xFF));
        drive.update_control(false, false, false, true, true);
        assert_eq!(drive.next_bit(), 1);
        for _ in 1..TRACK_BITS {
            drive.next_bit();
        }
        assert_eq!(drive.bit_pos(), 0);
    }

    #[test]
    fn disconnected_drive_saves_nothing() {
        let drive = AmigaFloppyDrive::disconnected();
        assert!(drive.state_size().is_none());
    }

    #[test]
    fn state_survives_save_and_restore() {
        let mut drive = AmigaFloppyDrive::new();
        drive.insert_disk(image("workbench.adf", 0xA5));
        for _ in 0..12 {
            step(&mut drive, true);
        }
        drive.advance_eclocks(MOTOR_SPINUP_TICKS);
        for _ in 0..1000 {
            drive.next_bit();
        }
        let bytes = save_to_vec(&drive).expect("connected");
        assert_eq!(bytes.len(), STATE_FIXED_LEN + "workbench.adf".len() + 1);

        let mut back = AmigaFloppyDrive::new();
        back.insert_disk(image("workbench.adf", 0xA5));
        back.restore_state(&mut ByteReader::new(&bytes))
            .expect("valid");
        assert_eq!(back.cylinder(), 12);
        assert_eq!(back.bit_pos(), 1000);
        assert!(back.status().ready);
        assert!(!back.image_mismatch());
        assert_eq!(save_to_vec(&back).expect("connected"), bytes);
    }

    #[test]
    fn different_image_is_flagged() {
        let mut drive = AmigaFloppyDrive::new();
        drive.insert_disk(image("game.adf", 1));
        let bytes = save_to_vec(&drive).expect("connected");

        let mut back = AmigaFloppyDrive::new();
        back.insert_disk(image("game.adf", 2));
        back.restore_state(&mut ByteReader::new(&bytes))
            .expect("valid");
        assert!(back.image_mismatch());
    }

    #[test]
    fn bad_cylinder_is_rejected() {
        let drive = AmigaFloppyDrive::new();
        let mut bytes = save_to_vec(&drive).expect("connected");
        bytes[5] = 200;
        let mut back = AmigaFloppyDrive::new();
        assert!(back.restore_state(&mut ByteReader::new(&bytes)).is_err());
    }
}
