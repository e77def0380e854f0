use fleet_agent::message::{CommandKind, InboundMessage, TaskCommand};
use fleet_agent::telemetry::{CpuCoreUsage, CpuSnapshot, Sample, SampleBody};

/// Builder for inbound `TASK_COMMAND` frames.
pub struct TaskCommandBuilder {
    cmd: TaskCommand,
}

impl TaskCommandBuilder {
    pub fn start(task_id: i64) -> Self {
        Self::new(CommandKind::Start, task_id)
    }

    pub fn cancel(task_id: i64) -> Self {
        Self::new(CommandKind::Cancel, task_id)
    }

    fn new(command: CommandKind, task_id: i64) -> Self {
        Self {
            cmd: TaskCommand {
                command,
                task_id,
                shell_id: 1,
                shell_content: "echo hello".to_string(),
                shell_type: "sh".to_string(),
                timestamp: 0,
            },
        }
    }

    pub fn shell_id(mut self, shell_id: u32) -> Self {
        self.cmd.shell_id = shell_id;
        self
    }

    pub fn script(mut self, script: &str) -> Self {
        self.cmd.shell_content = script.to_string();
        self
    }

    /// Scheduled end, epoch milliseconds.
    pub fn ends_at(mut self, timestamp_ms: u64) -> Self {
        self.cmd.timestamp = timestamp_ms;
        self
    }

    pub fn build(self) -> TaskCommand {
        self.cmd
    }

    /// The JSON frame as the server would send it.
    pub fn frame(self) -> String {
        serde_json::to_string(&InboundMessage::TaskCommand(self.cmd))
            .expect("task command serializes")
    }
}

/// A CPU sample for `task_id` with one core at `busy` percent.
pub fn telemetry_sample(task_id: i64, busy: f32) -> Sample {
    let core = CpuCoreUsage {
        busy,
        ..CpuCoreUsage::default()
    };
    Sample {
        task_id,
        taken_at: 0,
        body: SampleBody::Cpu(CpuSnapshot {
            total: core,
            cores: vec![core],
            processes: Vec::new(),
        }),
    }
}
