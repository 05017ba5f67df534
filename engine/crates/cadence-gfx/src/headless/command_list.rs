use std::{cell::RefCell, rc::Rc};

use ash::vk;

use crate::{
    commands::{barrier::GfxImageBarrier, blit::GfxImageBlit, pass::GfxPassBeginInfo},
    device::GfxCommandList,
    error::{GfxError, GfxResult},
    headless::state::{HeadlessCommand, HeadlessState},
};

/// 录制到内存中的命令列表，`end` 之后交给 [`HeadlessDevice`](super::HeadlessDevice) 等待提交
pub struct HeadlessCommandList {
    state: Rc<RefCell<HeadlessState>>,
    handle: vk::CommandBuffer,
    name: String,
    commands: Vec<HeadlessCommand>,
    recording: bool,
}

// new & init
impl HeadlessCommandList {
    pub(crate) fn new(state: Rc<RefCell<HeadlessState>>, handle: vk::CommandBuffer, name: &str) -> Self {
        Self {
            state,
            handle,
            name: name.to_string(),
            commands: vec![],
            recording: false,
        }
    }
}

// tools
impl HeadlessCommandList {
    fn record(&mut self, command: HeadlessCommand) {
        if !self.recording {
            log::warn!("command list \"{}\" records {:?} outside of begin/end", self.name, command);
        }
        self.commands.push(command);
    }
}

impl GfxCommandList for HeadlessCommandList {
    fn vk_handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    fn begin(&mut self) -> GfxResult<()> {
        if self.recording {
            return Err(GfxError::StillRecording);
        }
        self.recording = true;
        self.commands.clear();
        Ok(())
    }

    fn end(&mut self) -> GfxResult<()> {
        if !self.recording {
            return Err(GfxError::NotRecording);
        }
        self.recording = false;
        self.state
            .borrow_mut()
            .pending_lists
            .insert(self.handle, std::mem::take(&mut self.commands));
        Ok(())
    }

    fn begin_label(&mut self, label_name: &str, _label_color: [f32; 4]) {
        self.record(HeadlessCommand::BeginLabel(label_name.to_string()));
    }

    fn end_label(&mut self) {
        self.record(HeadlessCommand::EndLabel);
    }

    fn cmd_begin_pass(&mut self, info: &GfxPassBeginInfo) {
        self.record(HeadlessCommand::BeginPass(info.clone()));
    }

    fn cmd_end_pass(&mut self) {
        self.record(HeadlessCommand::EndPass);
    }

    fn cmd_image_memory_barrier(&mut self, _dependency_flags: vk::DependencyFlags, barriers: &[GfxImageBarrier]) {
        self.record(HeadlessCommand::Barrier(barriers.to_vec()));
    }

    fn cmd_blit_image(&mut self, blit: &GfxImageBlit) {
        self.record(HeadlessCommand::Blit(*blit));
    }

    fn cmd_draw(&mut self, vertex_count: u32, instance_count: u32, _first_vertex: u32, _first_instance: u32) {
        self.record(HeadlessCommand::Draw {
            vertex_count,
            instance_count,
        });
    }

    fn cmd_dispatch(&mut self, group_count: [u32; 3]) {
        self.record(HeadlessCommand::Dispatch(group_count));
    }
}
