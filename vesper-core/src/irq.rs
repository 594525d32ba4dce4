//! Interrupt line table
//!
//! Maps an interrupt identifier read from the controller to what the core
//! does with it. The line numbers come from the platform at boot; the table
//! itself never changes afterwards.
//!
//! # Interrupt Flow
//!
//! 1. Trap entry captures the interrupted process
//! 2. The controller is asked for the pending INTID
//! 3. [`InterruptRouter::route`] classifies it
//! 4. The executive acknowledges, acts, and resumes

/// First identifier the GIC reserves for special purposes (1020-1023).
pub const SPURIOUS_BASE: u32 = 1020;

/// Devices whose drivers may hook an interrupt line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceLine {
    Storage,
    Network0,
    Network1,
    Usb,
}

impl DeviceLine {
    pub const ALL: [Self; 4] = [Self::Storage, Self::Network0, Self::Network1, Self::Usb];

    const fn index(self) -> usize {
        match self {
            Self::Storage => 0,
            Self::Network0 => 1,
            Self::Network1 => 2,
            Self::Usb => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::Network0 => "net0",
            Self::Network1 => "net1",
            Self::Usb => "usb",
        }
    }
}

/// Interrupt identifiers of every line the core knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IrqLines {
    /// Physical timer PPI: scheduler quantum
    pub scheduler_tick: u32,
    /// Virtual timer PPI: sleep deadlines
    pub sleep_timer: u32,
    /// Console receive line feeding focused-process input
    pub input: u32,
    pub storage: u32,
    pub network: [u32; 2],
    pub usb: u32,
}

impl IrqLines {
    /// Every line unassigned.
    pub const NONE: Self = Self {
        scheduler_tick: SPURIOUS_BASE,
        sleep_timer: SPURIOUS_BASE,
        input: SPURIOUS_BASE,
        storage: SPURIOUS_BASE,
        network: [SPURIOUS_BASE; 2],
        usb: SPURIOUS_BASE,
    };

    pub fn device(&self, line: DeviceLine) -> u32 {
        match line {
            DeviceLine::Storage => self.storage,
            DeviceLine::Network0 => self.network[0],
            DeviceLine::Network1 => self.network[1],
            DeviceLine::Usb => self.usb,
        }
    }
}

/// What a pending interrupt means to the core.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IrqRoute {
    SchedulerTick,
    SleepTimer,
    Input,
    Device(DeviceLine),
    /// A line with no entry in the table
    Unknown(u32),
}

/// Driver hook: runs in trap context with interrupts masked.
pub type DeviceCallback = fn();

pub struct InterruptRouter {
    lines: IrqLines,
    callbacks: [Option<DeviceCallback>; 4],
}

impl InterruptRouter {
    pub const fn new(lines: IrqLines) -> Self {
        Self {
            lines,
            callbacks: [None; 4],
        }
    }

    pub fn lines(&self) -> &IrqLines {
        &self.lines
    }

    pub fn set_lines(&mut self, lines: IrqLines) {
        self.lines = lines;
    }

    /// Install the driver callback for `line`, replacing any previous one.
    pub fn install(&mut self, line: DeviceLine, callback: DeviceCallback) {
        self.callbacks[line.index()] = Some(callback);
    }

    pub fn callback(&self, line: DeviceLine) -> Option<DeviceCallback> {
        self.callbacks[line.index()]
    }

    pub fn route(&self, intid: u32) -> IrqRoute {
        let lines = &self.lines;
        if intid >= SPURIOUS_BASE {
            return IrqRoute::Unknown(intid);
        }
        if intid == lines.scheduler_tick {
            IrqRoute::SchedulerTick
        } else if intid == lines.sleep_timer {
            IrqRoute::SleepTimer
        } else if intid == lines.input {
            IrqRoute::Input
        } else if let Some(line) = DeviceLine::ALL.into_iter().find(|&l| lines.device(l) == intid) {
            IrqRoute::Device(line)
        } else {
            IrqRoute::Unknown(intid)
        }
    }
}
