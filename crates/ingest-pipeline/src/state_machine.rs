//! 上传项状态机
//!
//! 管理单个上传文件从接收到完成的状态转换

use ingest_core::{FailureKind, IngestError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error};

/// 处理状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum IngestState {
    Received,
    Staged,
    Parsed,
    Validated,
    Anonymized,
    Extracted,
    Stored,
    Done,
    Failed(FailureKind),
}

impl IngestState {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, IngestState::Done | IngestState::Failed(_))
    }
}

/// 状态转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum IngestEvent {
    Staged,
    Parsed,
    Validated,
    Anonymized,
    Extracted,
    Stored,
    MetadataRecorded,
    Failed(FailureKind),
}

/// 上传项状态机
#[derive(Debug)]
pub struct IngestStateMachine {
    transitions: HashMap<(IngestState, IngestEvent), IngestState>,
}

impl IngestStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        // 正常流程，没有重试
        transitions.insert((IngestState::Received, IngestEvent::Staged), IngestState::Staged);
        transitions.insert((IngestState::Staged, IngestEvent::Parsed), IngestState::Parsed);
        transitions.insert((IngestState::Parsed, IngestEvent::Validated), IngestState::Validated);
        transitions.insert(
            (IngestState::Validated, IngestEvent::Anonymized),
            IngestState::Anonymized,
        );
        transitions.insert(
            (IngestState::Anonymized, IngestEvent::Extracted),
            IngestState::Extracted,
        );
        transitions.insert((IngestState::Extracted, IngestEvent::Stored), IngestState::Stored);
        transitions.insert((IngestState::Stored, IngestEvent::MetadataRecorded), IngestState::Done);

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: &IngestState, event: &IngestEvent) -> bool {
        match event {
            IngestEvent::Failed(_) => !from.is_terminal(),
            _ => self.transitions.contains_key(&(*from, *event)),
        }
    }

    /// 执行状态转换
    pub fn transition(&self, from: &IngestState, event: &IngestEvent) -> Result<IngestState> {
        let next = match event {
            IngestEvent::Failed(kind) if !from.is_terminal() => Some(IngestState::Failed(*kind)),
            IngestEvent::Failed(_) => None,
            _ => self.transitions.get(&(*from, *event)).copied(),
        };

        next.ok_or_else(|| IngestError::InvalidStateTransition {
            from: format!("{:?}", from),
            event: format!("{:?}", event),
        })
    }

    /// 获取状态的所有可能事件（不含失败事件）
    pub fn get_possible_events(&self, current_state: &IngestState) -> Vec<IngestEvent> {
        self.transitions
            .keys()
            .filter(|(state, _)| state == current_state)
            .map(|(_, event)| *event)
            .collect()
    }
}

impl Default for IngestStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// 单个上传项的处理进度
#[derive(Debug)]
pub struct ItemProgress<'a> {
    machine: &'a IngestStateMachine,
    label: String,
    state: IngestState,
    history: Vec<IngestState>,
}

impl<'a> ItemProgress<'a> {
    pub fn new(machine: &'a IngestStateMachine, label: impl Into<String>) -> Self {
        Self {
            machine,
            label: label.into(),
            state: IngestState::Received,
            history: vec![IngestState::Received],
        }
    }

    pub fn state(&self) -> IngestState {
        self.state
    }

    /// 经历过的所有状态，按先后顺序
    pub fn history(&self) -> &[IngestState] {
        &self.history
    }

    pub fn advance(&mut self, event: IngestEvent) -> Result<IngestState> {
        let next = self.machine.transition(&self.state, &event)?;
        debug!("{}: {:?} -> {:?}", self.label, self.state, next);
        self.state = next;
        self.history.push(next);
        Ok(next)
    }

    /// 以错误终结该项；已处于终态时保持不变
    pub fn fail(&mut self, err: &IngestError) {
        error!("{} failed in state {:?}: {}", self.label, self.state, err);
        if let Ok(next) = self.machine.transition(&self.state, &IngestEvent::Failed(err.kind())) {
            self.state = next;
            self.history.push(next);
        }
    }
}
