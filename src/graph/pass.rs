//! Fixed-capacity pass pool
//!
//! Passes live in a 64-slot arena so graph rebuilds stay allocation-free on
//! the hot path; slots are claimed and released through a status flag rather
//! than by moving entries around.

use crate::backend::{
    ClearValue, CommandBufferHandle, FramebufferHandle, RenderBackend, RenderPassHandle,
};
use crate::graph::{GraphError, GraphResult, MAX_PASSES};

/// Called once per frame per pass to record its draw commands
pub type RecordCallback =
    Box<dyn FnMut(&mut dyn RenderBackend, CommandBufferHandle, FramebufferHandle)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Available,
    Used,
}

/// One slot of the pass pool
pub struct PassEntry {
    pub state: SlotState,
    pub id: String,
    pub swapchain_output: bool,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub render_pass: Option<RenderPassHandle>,
    pub framebuffers: Vec<FramebufferHandle>,
    pub clear_values: Option<Vec<ClearValue>>,
    pub record: Option<RecordCallback>,
    pub command_buffer: Option<CommandBufferHandle>,
}

impl PassEntry {
    fn empty() -> Self {
        Self {
            state: SlotState::Available,
            id: String::new(),
            swapchain_output: false,
            inputs: Vec::new(),
            outputs: Vec::new(),
            render_pass: None,
            framebuffers: Vec::new(),
            clear_values: None,
            record: None,
            command_buffer: None,
        }
    }
}

pub struct PassTable {
    slots: Vec<PassEntry>,
}

impl PassTable {
    pub fn new() -> Self {
        Self {
            slots: (0..MAX_PASSES).map(|_| PassEntry::empty()).collect(),
        }
    }

    /// Claim a slot for a new pass
    pub fn add_pass(&mut self, id: &str, swapchain_output: bool) -> GraphResult<usize> {
        if self.find(id).is_some() {
            log::error!("pass '{}' already exists", id);
            return Err(GraphError::Duplicate(format!("pass '{}'", id)));
        }

        let Some(index) = self
            .slots
            .iter()
            .position(|s| s.state == SlotState::Available)
        else {
            log::error!("pass pool exhausted ({} slots)", MAX_PASSES);
            return Err(GraphError::Capacity(format!(
                "pass pool limited to {} entries",
                MAX_PASSES
            )));
        };

        let entry = &mut self.slots[index];
        *entry = PassEntry::empty();
        entry.state = SlotState::Used;
        entry.id = id.to_string();
        entry.swapchain_output = swapchain_output;
        Ok(index)
    }

    /// Slot index of the Used pass named `id`
    pub fn find(&self, id: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.state == SlotState::Used && s.id == id)
    }

    /// Fail if the pass at `index` already declares `attachment` as an input
    pub fn check_input_free(&self, index: usize, attachment: &str) -> GraphResult<()> {
        let entry = &self.slots[index];
        if entry.inputs.iter().any(|name| name == attachment) {
            log::error!(
                "pass '{}' already declares input '{}'",
                entry.id,
                attachment
            );
            return Err(GraphError::Duplicate(format!(
                "input '{}' on pass '{}'",
                attachment, entry.id
            )));
        }
        Ok(())
    }

    /// Fail if the pass at `index` already declares `attachment` as an output
    pub fn check_output_free(&self, index: usize, attachment: &str) -> GraphResult<()> {
        let entry = &self.slots[index];
        if entry.outputs.iter().any(|name| name == attachment) {
            log::error!(
                "pass '{}' already declares output '{}'",
                entry.id,
                attachment
            );
            return Err(GraphError::Duplicate(format!(
                "output '{}' on pass '{}'",
                attachment, entry.id
            )));
        }
        Ok(())
    }

    /// Declare an input attachment name on the pass at `index`
    pub fn push_input(&mut self, index: usize, attachment: &str) -> GraphResult<()> {
        self.check_input_free(index, attachment)?;
        self.slots[index].inputs.push(attachment.to_string());
        Ok(())
    }

    /// Declare an output attachment name on the pass at `index`
    pub fn push_output(&mut self, index: usize, attachment: &str) -> GraphResult<()> {
        self.check_output_free(index, attachment)?;
        self.slots[index].outputs.push(attachment.to_string());
        Ok(())
    }

    /// Attach the recording callback; a missing pass is logged, not an error
    pub fn set_record_callback(&mut self, id: &str, callback: RecordCallback) {
        match self.find(id) {
            Some(index) => self.slots[index].record = Some(callback),
            None => log::warn!("set_record_callback: pass '{}' not found", id),
        }
    }

    pub fn entry(&self, index: usize) -> &PassEntry {
        &self.slots[index]
    }

    pub fn entry_mut(&mut self, index: usize) -> &mut PassEntry {
        &mut self.slots[index]
    }

    /// Slot indices of all Used passes
    pub fn used_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.state == SlotState::Used)
            .map(|(i, _)| i)
    }

    pub fn used_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state == SlotState::Used)
            .count()
    }
}

impl Default for PassTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_pass_id_is_rejected() {
        let mut table = PassTable::new();
        table.add_pass("final", true).unwrap();
        assert!(matches!(
            table.add_pass("final", false),
            Err(GraphError::Duplicate(_))
        ));
        assert_eq!(table.used_count(), 1);
        assert!(table.entry(0).swapchain_output);
    }

    #[test]
    fn pool_overflow_fails_with_capacity() {
        let mut table = PassTable::new();
        for i in 0..MAX_PASSES {
            table.add_pass(&format!("pass{}", i), false).unwrap();
        }
        assert!(matches!(
            table.add_pass("one_too_many", false),
            Err(GraphError::Capacity(_))
        ));
        assert_eq!(table.used_count(), MAX_PASSES);
    }

    #[test]
    fn duplicate_input_on_one_side_is_rejected() {
        let mut table = PassTable::new();
        let index = table.add_pass("geometry", false).unwrap();
        table.push_input(index, "shadow_map").unwrap();
        assert!(matches!(
            table.push_input(index, "shadow_map"),
            Err(GraphError::Duplicate(_))
        ));
        // the same name on the other side is fine
        table.push_output(index, "shadow_map").unwrap();
        assert_eq!(table.entry(index).inputs.len(), 1);
    }
}
