//! The executive: one owner for all process-core state
//!
//! Every trap ends up here. The trap handler hands over the hardware frame
//! and the [`Machine`]; the executive captures the interrupted context,
//! decides, and restores whatever should run next into the same frame.
//!
//! # Trap Flow
//!
//! 1. Capture the frame into the current PCB (or the idle context)
//! 2. Route the interrupt or dispatch the syscall
//! 3. Reschedule if the path calls for it
//! 4. Restore the current PCB (or the idle context) into the frame

use log::{debug, info, trace, warn};
use vesper_arch::registers::esr;
use vesper_syscall::KeyEvent;

use crate::error::{MemoryError, ProcessError};
use crate::fatal::{FatalKind, FatalReport};
use crate::irq::{DeviceCallback, DeviceLine, InterruptRouter, IrqLines, IrqRoute};
use crate::machine::{Machine, SystemTimer};
use crate::memory::RegionAllocator;
use crate::process::{Pcb, ProcessId, ProcessMode, ProcessState, ProcessTable, SpawnParams};
use crate::sched;
use crate::sleep::DeadlineQueue;
use crate::syscall::{self, Flow, SyscallArgs};
use crate::trap::{SavedContext, TrapFrame};

/// Boot-time parameters.
#[derive(Clone, Copy, Debug)]
pub struct ExecutiveConfig {
    /// Window process stacks and heaps are carved from
    pub memory_base: usize,
    pub memory_size: usize,
    pub lines: IrqLines,
    /// Context resumed when no process can run
    pub idle: SavedContext,
    /// Link register of every new process
    pub exit_trampoline: u64,
}

pub struct Executive {
    pub(crate) table: ProcessTable,
    pub(crate) memory: RegionAllocator,
    pub(crate) sleepers: DeadlineQueue,
    pub(crate) router: InterruptRouter,
    idle: SavedContext,
    exit_trampoline: u64,
}

impl Executive {
    pub const fn new() -> Self {
        Self {
            table: ProcessTable::new(),
            memory: RegionAllocator::empty(),
            sleepers: DeadlineQueue::new(),
            router: InterruptRouter::new(IrqLines::NONE),
            idle: SavedContext::ZERO,
            exit_trampoline: 0,
        }
    }

    pub fn configure(&mut self, config: ExecutiveConfig) -> Result<(), MemoryError> {
        self.memory.init(config.memory_base, config.memory_size)?;
        self.router.set_lines(config.lines);
        self.idle = config.idle;
        self.exit_trampoline = config.exit_trampoline;
        info!(
            "executive: process memory {:#x}+{:#x}, {} pages",
            config.memory_base,
            config.memory_size,
            self.memory.total_pages()
        );
        Ok(())
    }

    /// Hook a driver onto a device interrupt line.
    pub fn install_callback(&mut self, line: DeviceLine, callback: DeviceCallback) {
        debug!("irq: {} callback installed", line.name());
        self.router.install(line, callback);
    }

    pub fn create_process(
        &mut self,
        entry: u64,
        stack_size: usize,
        mode: ProcessMode,
        name: &str,
    ) -> Result<ProcessId, ProcessError> {
        self.table.create(
            &mut self.memory,
            SpawnParams {
                entry,
                stack_size,
                mode,
                name,
                exit_trampoline: self.exit_trampoline,
            },
        )
    }

    /// Stop `id` and release everything it owns.
    ///
    /// If it was running, another process (or the idle context) is chosen
    /// before this returns, so the trap in progress never resumes it.
    pub fn terminate_process(&mut self, id: ProcessId) -> Result<(), ProcessError> {
        let was_running = self.table.terminate(&mut self.memory, id)?;
        self.sleepers.remove(id);
        if was_running {
            let next = sched::halt(&mut self.table);
            trace!("terminate: pid {} was running, now {:?}", id, next);
        }
        Ok(())
    }

    pub fn focus(&mut self, id: ProcessId) -> Result<(), ProcessError> {
        self.table.focus(id)
    }

    /// Queue an input event for the focused process; dropped if none.
    pub fn deliver_input(&mut self, event: KeyEvent) {
        if self.table.deliver_input(event).is_none() {
            trace!("input: no focused process, event dropped");
        }
    }

    pub fn process(&self, id: ProcessId) -> Option<&Pcb> {
        self.table.get(id)
    }

    pub fn current(&self) -> Option<&Pcb> {
        self.table.current()
    }

    pub fn live_count(&self) -> usize {
        self.table.live_count()
    }

    pub fn table(&self) -> &ProcessTable {
        &self.table
    }

    pub fn memory(&self) -> &RegionAllocator {
        &self.memory
    }

    pub fn router(&self) -> &InterruptRouter {
        &self.router
    }

    /// Pick the first process and start the quantum.
    ///
    /// Returns the context to enter: a process, or the idle loop.
    pub fn start(&mut self, timer: &mut dyn SystemTimer) -> &SavedContext {
        let selection = sched::start(&mut self.table);
        info!(
            "executive: starting with {} live processes, first {:?}",
            self.table.live_count(),
            selection
        );
        timer.rearm_tick();
        self.next_context()
    }

    /// IRQ trap.
    pub fn handle_irq<F: TrapFrame + ?Sized>(&mut self, frame: &mut F, machine: &mut Machine<'_>) {
        self.capture(frame);

        // Nothing pending (spurious): just resume
        if let Some(intid) = machine.interrupts.pending() {
            self.route(intid, machine);
        }

        self.restore(frame);
    }

    /// Synchronous exception trap. An `Err` must take the fatal path.
    pub fn handle_sync<F: TrapFrame + ?Sized>(
        &mut self,
        frame: &mut F,
        machine: &mut Machine<'_>,
    ) -> Result<(), FatalReport> {
        let syndrome = frame.syndrome();
        let fault_address = frame.fault_address();
        let ctx = frame.capture();
        let address = ctx.program_counter;
        let fatal = move |kind| FatalReport {
            kind,
            syndrome,
            address,
            fault_address,
        };

        let Some(pcb) = self.table.current_mut() else {
            return Err(fatal(FatalKind::NoCurrentProcess));
        };
        pcb.context = ctx;
        let caller = pcb.id;

        let Some(number) = esr::svc_immediate(syndrome) else {
            return Err(fatal(FatalKind::UnexpectedException {
                class: esr::exception_class(syndrome),
            }));
        };

        let args = SyscallArgs::from_context(&ctx);
        let flow = syscall::dispatch(self, machine, caller, number, &args).map_err(fatal)?;

        match flow {
            Flow::Return(value) => self.set_return(caller, value),
            Flow::Reschedule(value) => {
                self.set_return(caller, value);
                sched::yield_now(&mut self.table);
            }
            Flow::Block(value) => {
                self.set_return(caller, value);
                sched::halt(&mut self.table);
            }
            // terminate_process already rescheduled
            Flow::Exit => {}
        }

        self.restore(frame);
        Ok(())
    }

    fn route(&mut self, intid: u32, machine: &mut Machine<'_>) {
        match self.router.route(intid) {
            IrqRoute::SchedulerTick => {
                machine.timer.rearm_tick();
                machine.interrupts.acknowledge(intid);
                sched::tick(&mut self.table);
            }
            IrqRoute::SleepTimer => {
                let woke = self.wake_sleepers(&mut *machine.timer);
                machine.interrupts.acknowledge(intid);
                // An idle CPU would otherwise wait for the next quantum
                if woke > 0 && self.table.current.is_none() {
                    sched::tick(&mut self.table);
                }
            }
            IrqRoute::Input => {
                machine.interrupts.acknowledge(intid);
                while let Some(event) = machine.input.poll() {
                    self.deliver_input(event);
                }
            }
            IrqRoute::Device(line) => {
                machine.interrupts.acknowledge(intid);
                match self.router.callback(line) {
                    Some(callback) => callback(),
                    None => warn!("irq: no {} callback for INTID {}", line.name(), intid),
                }
            }
            IrqRoute::Unknown(id) => {
                warn!("irq: unhandled INTID {}", id);
                machine.interrupts.acknowledge(intid);
            }
        }
    }

    /// Flip every sleeper whose deadline passed back to `Ready`, then
    /// re-arm the comparator for the next deadline. Returns how many woke.
    fn wake_sleepers(&mut self, timer: &mut dyn SystemTimer) -> usize {
        let now = timer.now_ms();
        let mut woke = 0;
        for id in self.sleepers.drain_expired(now) {
            if let Some(pcb) = self.table.get_mut(id)
                && pcb.state == ProcessState::Blocked
            {
                pcb.state = ProcessState::Ready;
                woke += 1;
                trace!("sleep: pid {} woke at {} ms", id, now);
            }
        }

        match self.sleepers.next_deadline() {
            Some(deadline) => timer.arm_sleep(deadline),
            None => timer.disarm_sleep(),
        }
        woke
    }

    fn set_return(&mut self, caller: ProcessId, value: i64) {
        if let Some(pcb) = self.table.get_mut(caller) {
            pcb.context.set_return(value as u64);
        }
    }

    fn capture<F: TrapFrame + ?Sized>(&mut self, frame: &F) {
        let ctx = frame.capture();
        match self.table.current_mut() {
            Some(pcb) => pcb.context = ctx,
            None => self.idle = ctx,
        }
    }

    fn restore<F: TrapFrame + ?Sized>(&self, frame: &mut F) {
        frame.restore(self.next_context());
    }

    fn next_context(&self) -> &SavedContext {
        match self.table.current() {
            Some(pcb) => &pcb.context,
            None => &self.idle,
        }
    }
}

impl Default for Executive {
    fn default() -> Self {
        Self::new()
    }
}
