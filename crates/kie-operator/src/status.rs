//! Lifecycle conditions of a [`KieApp`](crate::crd::KieApp).
//!
//! Conditions are kept in a [`ConditionBuffer`], a queue holding at most [`CONDITION_CAPACITY`]
//! entries that drops the oldest one when full. Consecutive Provisioning or Deployed conditions
//! are coalesced, as are consecutive Failed conditions with the same reason and message.

use std::collections::VecDeque;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use crate::crd::KieAppStatus;

/// Maximum number of conditions kept on the status.
pub const CONDITION_CAPACITY: usize = 30;

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,

    pub status: ConditionStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<Time>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonType>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

#[derive(
    AsRefStr,
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    Eq,
    Hash,
    JsonSchema,
    PartialEq,
    Serialize,
)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionType {
    /// The KieApp is being provisioned.
    #[default]
    Provisioning,
    /// The KieApp is deployed.
    Deployed,
    /// The KieApp is in a failed state.
    Failed,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionStatus {
    #[default]
    True,
    False,
    Unknown,
}

#[derive(
    AsRefStr, Clone, Copy, Debug, Deserialize, Display, Eq, Hash, JsonSchema, PartialEq, Serialize,
)]
#[serde(rename_all = "PascalCase")]
pub enum ReasonType {
    /// Unable to deploy the application.
    DeploymentFailed,
    /// An invalid configuration caused an error.
    ConfigurationError,
    /// Dependencies do not exist or cannot be found.
    MissingDependencies,
    /// Unable to determine the error.
    Unknown,
}

/// Fixed capacity queue of [`Condition`]s, serialized as a plain list.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConditionBuffer(VecDeque<Condition>);

impl Default for ConditionBuffer {
    fn default() -> Self {
        Self(VecDeque::with_capacity(CONDITION_CAPACITY))
    }
}

impl ConditionBuffer {
    /// Appends a condition, dropping the oldest one when the buffer is full.
    pub fn push(&mut self, condition: Condition) {
        if self.0.len() == CONDITION_CAPACITY {
            self.0.pop_front();
        }
        self.0.push_back(condition);
    }

    pub fn last(&self) -> Option<&Condition> {
        self.0.back()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, Condition> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a ConditionBuffer {
    type IntoIter = std::collections::vec_deque::Iter<'a, Condition>;
    type Item = &'a Condition;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl From<Vec<Condition>> for ConditionBuffer {
    fn from(conditions: Vec<Condition>) -> Self {
        let mut buffer = Self::default();
        let skip = conditions.len().saturating_sub(CONDITION_CAPACITY);
        for condition in conditions.into_iter().skip(skip) {
            buffer.push(condition);
        }
        buffer
    }
}

impl From<ConditionBuffer> for Vec<Condition> {
    fn from(buffer: ConditionBuffer) -> Self {
        buffer.0.into()
    }
}

impl Serialize for ConditionBuffer {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.0)
    }
}

impl<'de> Deserialize<'de> for ConditionBuffer {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<Condition>::deserialize(deserializer).map(Self::from)
    }
}

impl KieAppStatus {
    /// Records that provisioning started. Returns `false` if the last condition already was
    /// Provisioning.
    pub fn set_provisioning(&mut self, version: &str) -> bool {
        self.transition(ConditionType::Provisioning, version)
    }

    /// Records a successful deployment. Returns `false` if the last condition already was
    /// Deployed.
    pub fn set_deployed(&mut self, version: &str) -> bool {
        self.transition(ConditionType::Deployed, version)
    }

    /// Records a failure. Returns `false` if the last condition already reported the same
    /// failure.
    pub fn set_failed(
        &mut self,
        reason: ReasonType,
        message: impl Into<String>,
        version: &str,
    ) -> bool {
        let message = message.into();
        if self.conditions.last().is_some_and(|condition| {
            condition.type_ == ConditionType::Failed
                && condition.reason == Some(reason)
                && condition.message == message
                && condition.version == version
        }) {
            tracing::debug!(%reason, "failure already recorded");
            return false;
        }

        self.record(Condition {
            type_: ConditionType::Failed,
            status: ConditionStatus::False,
            last_transition_time: Some(now()),
            reason: Some(reason),
            message,
            version: version.to_owned(),
        });
        true
    }

    fn transition(&mut self, type_: ConditionType, version: &str) -> bool {
        if self
            .conditions
            .last()
            .is_some_and(|condition| condition.type_ == type_)
        {
            tracing::debug!(condition = %type_, "condition unchanged, not recording it again");
            return false;
        }

        self.record(Condition {
            type_,
            status: ConditionStatus::True,
            last_transition_time: Some(now()),
            reason: None,
            message: String::new(),
            version: version.to_owned(),
        });
        true
    }

    fn record(&mut self, condition: Condition) {
        self.phase = Some(condition.type_);
        self.conditions.push(condition);
    }
}

fn now() -> Time {
    Time(k8s_openapi::jiff::Timestamp::now())
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    fn condition(type_: ConditionType, version: &str) -> Condition {
        Condition {
            type_,
            version: version.to_owned(),
            ..Condition::default()
        }
    }

    #[test]
    fn deployed_twice_records_one_condition() {
        let mut status = KieAppStatus::default();

        assert!(status.set_deployed("7.8.0"));
        assert!(!status.set_deployed("7.8.0"));

        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.phase, Some(ConditionType::Deployed));
    }

    #[test]
    fn transitions_are_recorded_in_order() {
        let mut status = KieAppStatus::default();

        assert!(status.set_provisioning("7.8.0"));
        assert!(status.set_failed(ReasonType::ConfigurationError, "bad config", "7.8.0"));
        assert!(status.set_failed(ReasonType::MissingDependencies, "no config map", "7.8.0"));
        assert!(status.set_deployed("7.8.0"));

        let types: Vec<_> = status.conditions.iter().map(|c| c.type_).collect();
        assert_eq!(
            types,
            [
                ConditionType::Provisioning,
                ConditionType::Failed,
                ConditionType::Failed,
                ConditionType::Deployed
            ]
        );
        assert_eq!(status.phase, Some(ConditionType::Deployed));

        let failed = status.conditions.iter().nth(1).expect("failed condition");
        assert_eq!(failed.status, ConditionStatus::False);
        assert_eq!(failed.reason, Some(ReasonType::ConfigurationError));
        assert_eq!(failed.message, "bad config");
    }

    #[test]
    fn repeated_failure_records_one_condition() {
        let mut status = KieAppStatus::default();

        assert!(status.set_failed(ReasonType::DeploymentFailed, "api unavailable", "7.8.0"));
        assert!(!status.set_failed(ReasonType::DeploymentFailed, "api unavailable", "7.8.0"));
        assert!(status.set_failed(ReasonType::DeploymentFailed, "quota exceeded", "7.8.0"));

        assert_eq!(status.conditions.len(), 2);
        assert_eq!(status.phase, Some(ConditionType::Failed));
    }

    #[test]
    fn buffer_drops_oldest_when_full() {
        let mut status = KieAppStatus::default();

        for i in 0..CONDITION_CAPACITY + 5 {
            status.set_failed(ReasonType::Unknown, format!("failure {i}"), "7.8.0");
        }

        assert_eq!(status.conditions.len(), CONDITION_CAPACITY);
        assert_eq!(
            status.conditions.iter().next().map(|c| c.message.as_str()),
            Some("failure 5")
        );
        assert_eq!(
            status.conditions.last().map(|c| c.message.as_str()),
            Some(format!("failure {}", CONDITION_CAPACITY + 4).as_str())
        );
    }

    #[test]
    fn oversized_lists_keep_the_newest_conditions() {
        let conditions: Vec<_> = (0..CONDITION_CAPACITY + 2)
            .map(|i| condition(ConditionType::Failed, &i.to_string()))
            .collect();

        let buffer = ConditionBuffer::from(conditions);

        assert_eq!(buffer.len(), CONDITION_CAPACITY);
        assert_eq!(buffer.iter().next().map(|c| c.version.as_str()), Some("2"));
    }

    #[test]
    fn serializes_as_list() {
        let input = indoc! {"
            conditions:
              - type: Provisioning
                status: 'True'
                version: 7.8.0
              - type: Failed
                status: 'False'
                reason: MissingDependencies
                message: configmap not found
            phase: Failed
            deployments: []
        "};

        let status: KieAppStatus = serde_yaml::from_str(input).expect("invalid test input");
        assert_eq!(status.conditions.len(), 2);
        assert_eq!(
            status.conditions.last().and_then(|c| c.reason),
            Some(ReasonType::MissingDependencies)
        );

        let value = serde_json::to_value(&status).expect("status serializes");
        assert_eq!(value["conditions"][0]["type"], "Provisioning");
        assert_eq!(value["conditions"][1]["reason"], "MissingDependencies");
        assert!(value["conditions"][0].get("reason").is_none());
    }
}
