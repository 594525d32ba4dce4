//! The process table
//!
//! Slots are handed out in two phases: while the table is still growing the
//! next never-used slot is taken; once it has grown to capacity the first
//! `Stopped` slot is reused.

use log::{debug, trace};
use vesper_syscall::KeyEvent;

use super::{MAX_PROCESSES, Pcb, ProcessId, ProcessMode, ProcessState};
use crate::error::ProcessError;
use crate::memory::RegionAllocator;
use crate::trap::SavedContext;

/// Stack alignment required by AAPCS64
const STACK_ALIGN: usize = 16;

/// Everything needed to start a process.
#[derive(Clone, Copy, Debug)]
pub struct SpawnParams<'a> {
    pub entry: u64,
    pub stack_size: usize,
    pub mode: ProcessMode,
    pub name: &'a str,
    /// Link register value: where a returning entry function lands
    pub exit_trampoline: u64,
}

pub struct ProcessTable {
    slots: [Pcb; MAX_PROCESSES],
    /// Slot of the running process; `None` while the CPU idles
    pub(crate) current: Option<usize>,
    /// Slot the next scan starts after
    pub(crate) cursor: Option<usize>,
    /// Slots `0..next_free` have been used at least once
    next_free: usize,
    live: usize,
    next_id: u16,
}

impl ProcessTable {
    pub const fn new() -> Self {
        Self {
            slots: [Pcb::EMPTY; MAX_PROCESSES],
            current: None,
            cursor: None,
            next_free: 0,
            live: 0,
            next_id: 1,
        }
    }

    /// Create a `Ready` process with a fresh stack region.
    pub fn create(
        &mut self,
        memory: &mut RegionAllocator,
        params: SpawnParams<'_>,
    ) -> Result<ProcessId, ProcessError> {
        if params.stack_size == 0 {
            return Err(ProcessError::InvalidStackSize);
        }

        let (index, fresh) = self.allocate_slot()?;
        let id = self.allocate_id();

        let stack = match memory.allocate(params.stack_size, id) {
            Ok(handle) => handle,
            Err(e) => {
                debug!("no stack for {}: {}", params.name, e);
                if fresh {
                    self.next_free -= 1;
                }
                return Err(ProcessError::OutOfMemory);
            }
        };
        let (stack_base, stack_size) = match memory.region(stack) {
            Some(region) => (region.base, region.len),
            None => return Err(ProcessError::OutOfMemory),
        };
        let stack_top = (stack_base + stack_size) & !(STACK_ALIGN - 1);

        let pcb = &mut self.slots[index];
        *pcb = Pcb::EMPTY;
        pcb.id = id;
        pcb.mode = params.mode;
        pcb.stack = Some(stack);
        pcb.stack_base = stack_base;
        pcb.stack_size = stack_size;
        pcb.context = SavedContext::start(
            params.entry,
            stack_top as u64,
            params.mode.processor_state(),
            params.exit_trampoline,
        );
        pcb.set_name(params.name);
        pcb.state = ProcessState::Ready;
        self.live += 1;

        debug!(
            "created process {} '{}' slot={} entry={:#x} stack={:#x}..{:#x}",
            id,
            params.name,
            index,
            params.entry,
            stack_base,
            stack_top
        );
        Ok(id)
    }

    /// Release everything `id` holds and zero its slot.
    ///
    /// Returns `true` if it was the running process, in which case the
    /// caller must reschedule before returning to any process.
    pub fn terminate(
        &mut self,
        memory: &mut RegionAllocator,
        id: ProcessId,
    ) -> Result<bool, ProcessError> {
        let index = self.index_of(id).ok_or(ProcessError::NoSuchProcess)?;
        let was_running = self.slots[index].state == ProcessState::Running;

        // The stack is owned by `id` like every heap region
        let released = memory.release_owned_by(id);
        trace!("process {} released {} regions", id, released);

        self.slots[index] = Pcb::EMPTY;
        self.live -= 1;
        if self.current == Some(index) {
            self.current = None;
        }

        debug!("terminated process {}", id);
        Ok(was_running)
    }

    /// Give input focus to `id`, taking it from the previous holder.
    pub fn focus(&mut self, id: ProcessId) -> Result<(), ProcessError> {
        let index = self.index_of(id).ok_or(ProcessError::NoSuchProcess)?;
        for pcb in self.slots.iter_mut() {
            pcb.focused = false;
        }
        self.slots[index].focused = true;
        Ok(())
    }

    pub fn focused(&self) -> Option<ProcessId> {
        self.iter().find(|p| p.focused).map(|p| p.id)
    }

    /// Queue an input event for the focused process.
    ///
    /// Returns the receiver, or `None` if nothing has focus.
    pub fn deliver_input(&mut self, event: KeyEvent) -> Option<ProcessId> {
        let pcb = self.slots[..self.next_free]
            .iter_mut()
            .find(|p| p.is_live() && p.focused)?;
        if pcb.input.push(event) {
            trace!("input ring of process {} overflowed", pcb.id);
        }
        Some(pcb.id)
    }

    pub fn get(&self, id: ProcessId) -> Option<&Pcb> {
        self.index_of(id).map(|i| &self.slots[i])
    }

    pub fn get_mut(&mut self, id: ProcessId) -> Option<&mut Pcb> {
        self.index_of(id).map(|i| &mut self.slots[i])
    }

    pub fn current(&self) -> Option<&Pcb> {
        self.current.map(|i| &self.slots[i])
    }

    pub fn current_mut(&mut self) -> Option<&mut Pcb> {
        self.current.map(|i| &mut self.slots[i])
    }

    pub fn current_id(&self) -> Option<ProcessId> {
        self.current().map(|p| p.id)
    }

    /// Number of live (not `Stopped`) processes.
    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn running_count(&self) -> usize {
        self.iter().filter(|p| p.state == ProcessState::Running).count()
    }

    /// Live processes in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Pcb> {
        self.slots[..self.next_free].iter().filter(|p| p.is_live())
    }

    /// Slot index of a PCB, for diagnostics.
    pub fn slot_of(&self, id: ProcessId) -> Option<usize> {
        self.index_of(id)
    }

    pub(crate) fn allocated(&self) -> usize {
        self.next_free
    }

    pub(crate) fn slot(&self, index: usize) -> &Pcb {
        &self.slots[index]
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> &mut Pcb {
        &mut self.slots[index]
    }

    fn index_of(&self, id: ProcessId) -> Option<usize> {
        if id.is_kernel() {
            return None;
        }
        self.slots[..self.next_free]
            .iter()
            .position(|p| p.is_live() && p.id == id)
    }

    /// Returns the slot and whether it was never used before.
    fn allocate_slot(&mut self) -> Result<(usize, bool), ProcessError> {
        if self.next_free < MAX_PROCESSES {
            let index = self.next_free;
            self.next_free += 1;
            return Ok((index, true));
        }
        self.slots
            .iter()
            .position(|p| p.state == ProcessState::Stopped)
            .map(|index| (index, false))
            .ok_or(ProcessError::OutOfProcessSlots)
    }

    /// Monotonic, skipping 0 and any id still in use after wrap-around.
    fn allocate_id(&mut self) -> ProcessId {
        loop {
            let candidate = ProcessId::new(self.next_id);
            self.next_id = self.next_id.wrapping_add(1);
            if !candidate.is_kernel() && self.index_of(candidate).is_none() {
                return candidate;
            }
        }
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::PAGE_SIZE;

    const STACK: usize = 2 * PAGE_SIZE;

    fn memory() -> RegionAllocator {
        RegionAllocator::new(0x4800_0000, 64 * PAGE_SIZE).unwrap()
    }

    fn spawn(table: &mut ProcessTable, memory: &mut RegionAllocator) -> Result<ProcessId, ProcessError> {
        table.create(
            memory,
            SpawnParams {
                entry: 0x4008_0000,
                stack_size: STACK,
                mode: ProcessMode::User,
                name: "test",
                exit_trampoline: 0x4008_1000,
            },
        )
    }

    #[test]
    fn test_create_sets_up_context() {
        let mut mem = memory();
        let mut table = ProcessTable::new();
        let id = spawn(&mut table, &mut mem).unwrap();

        let pcb = table.get(id).unwrap();
        assert_eq!(pcb.state, ProcessState::Ready);
        assert_ne!(id, ProcessId::KERNEL);
        assert_eq!(pcb.context.program_counter, 0x4008_0000);
        assert_eq!(pcb.context.stack_pointer as usize, pcb.stack_top());
        assert_eq!(pcb.context.stack_pointer % 16, 0);
        assert_eq!(pcb.context.registers[30], 0x4008_1000);
        assert!(pcb.stack.is_some());
        assert_eq!(table.live_count(), 1);
    }

    #[test]
    fn test_zero_stack_rejected() {
        let mut mem = memory();
        let mut table = ProcessTable::new();
        let err = table.create(
            &mut mem,
            SpawnParams {
                entry: 0,
                stack_size: 0,
                mode: ProcessMode::Kernel,
                name: "",
                exit_trampoline: 0,
            },
        );
        assert_eq!(err, Err(ProcessError::InvalidStackSize));
    }

    #[test]
    fn test_full_table_then_reuse() {
        let mut mem = memory();
        let mut table = ProcessTable::new();
        let ids: Vec<_> = (0..MAX_PROCESSES)
            .map(|_| spawn(&mut table, &mut mem).unwrap())
            .collect();
        assert_eq!(spawn(&mut table, &mut mem), Err(ProcessError::OutOfProcessSlots));

        let victim = ids[5];
        let slot = table.slot_of(victim).unwrap();
        table.terminate(&mut mem, victim).unwrap();

        let reborn = spawn(&mut table, &mut mem).unwrap();
        assert_eq!(table.slot_of(reborn), Some(slot));
        assert_ne!(reborn, victim);
        assert!(table.get(victim).is_none());
    }

    #[test]
    fn test_out_of_memory_releases_slot() {
        let mut mem = RegionAllocator::new(0x4800_0000, STACK).unwrap();
        let mut table = ProcessTable::new();
        spawn(&mut table, &mut mem).unwrap();
        assert_eq!(spawn(&mut table, &mut mem), Err(ProcessError::OutOfMemory));
        assert_eq!(table.allocated(), 1);
        assert_eq!(table.live_count(), 1);
    }

    #[test]
    fn test_terminate_frees_all_regions_and_zeroes() {
        let mut mem = memory();
        let mut table = ProcessTable::new();
        let id = spawn(&mut table, &mut mem).unwrap();
        let before = mem.free_pages();
        mem.allocate(PAGE_SIZE, id).unwrap();

        let slot = table.slot_of(id).unwrap();
        table.get_mut(id).unwrap().input.push(KeyEvent::key(0, 4));
        table.focus(id).unwrap();

        assert_eq!(table.terminate(&mut mem, id), Ok(false));
        assert_eq!(mem.free_pages(), before + STACK / PAGE_SIZE);
        assert_eq!(*table.slot(slot), Pcb::EMPTY);
        assert_eq!(table.focused(), None);
        assert_eq!(table.terminate(&mut mem, id), Err(ProcessError::NoSuchProcess));
    }

    #[test]
    fn test_ids_are_never_kernel() {
        let mut table = ProcessTable::new();
        table.next_id = u16::MAX;
        let a = table.allocate_id();
        let b = table.allocate_id();
        assert_eq!(a.as_u16(), u16::MAX);
        assert_eq!(b.as_u16(), 1);
    }

    #[test]
    fn test_input_goes_to_focused_only() {
        let mut mem = memory();
        let mut table = ProcessTable::new();
        let a = spawn(&mut table, &mut mem).unwrap();
        let b = spawn(&mut table, &mut mem).unwrap();

        assert_eq!(table.deliver_input(KeyEvent::key(0, 4)), None);

        table.focus(a).unwrap();
        table.focus(b).unwrap();
        assert_eq!(table.deliver_input(KeyEvent::key(0, 5)), Some(b));
        assert!(table.get(a).unwrap().input.is_empty());
        assert_eq!(table.get_mut(b).unwrap().input.pop(), Some(KeyEvent::key(0, 5)));
    }
}
