//! Typed extraction of a response member.
//!
//! A request names the member it wants (`"device"`, `"notifications"`, ...),
//! the Rust type to decode it into, and an [`ExtractionPolicy`] that decides
//! which fields of the member are visible to the decoder.

use std::borrow::Cow;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// A named whitelist of object fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldPolicy {
    /// Policy name, used in logs and error messages.
    pub name: &'static str,
    /// Fields kept; everything else is removed before decoding.
    pub fields: &'static [&'static str],
}

impl FieldPolicy {
    /// Declare a policy.
    pub const fn new(name: &'static str, fields: &'static [&'static str]) -> Self {
        Self { name, fields }
    }

    fn retain(&self, object: &mut Map<String, Value>) {
        object.retain(|key, _| self.fields.iter().any(|f| *f == key.as_str()));
    }
}

/// How much of a member the decoder sees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExtractionPolicy {
    /// The member as received.
    #[default]
    Full,
    /// Only the whitelisted fields.
    Fields(FieldPolicy),
}

impl ExtractionPolicy {
    /// Policy name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Fields(policy) => policy.name,
        }
    }

    /// Apply the policy to a member value.
    ///
    /// Objects are filtered directly; arrays have each object element
    /// filtered. Other values pass through.
    pub fn project(&self, value: Value) -> Value {
        let Self::Fields(policy) = self else {
            return value;
        };
        match value {
            Value::Object(mut object) => {
                policy.retain(&mut object);
                Value::Object(object)
            }
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::Object(mut object) => {
                            policy.retain(&mut object);
                            Value::Object(object)
                        }
                        other => other,
                    })
                    .collect(),
            ),
            other => other,
        }
    }
}

impl From<FieldPolicy> for ExtractionPolicy {
    fn from(policy: FieldPolicy) -> Self {
        Self::Fields(policy)
    }
}

/// Which member to decode, into what, under which policy.
#[derive(Clone, Debug)]
pub struct Extract<T> {
    member: Cow<'static, str>,
    policy: ExtractionPolicy,
    _target: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Extract<T> {
    /// Decode the response member `member` with [`ExtractionPolicy::Full`].
    pub fn member(member: impl Into<Cow<'static, str>>) -> Self {
        Self {
            member: member.into(),
            policy: ExtractionPolicy::Full,
            _target: PhantomData,
        }
    }

    /// Replace the extraction policy.
    #[must_use]
    pub fn with_policy(mut self, policy: impl Into<ExtractionPolicy>) -> Self {
        self.policy = policy.into();
        self
    }

    /// Member name.
    pub fn member_name(&self) -> &str {
        &self.member
    }

    /// Active policy.
    pub fn policy(&self) -> ExtractionPolicy {
        self.policy
    }

    /// Decode the member out of a response object.
    ///
    /// A missing member decodes from `null`, so `Option<T>` targets accept
    /// responses that omit it.
    pub fn decode(&self, payload: &Value) -> Result<T, String> {
        let member = payload.get(&*self.member).cloned().unwrap_or(Value::Null);
        serde_json::from_value(self.policy.project(member)).map_err(|e| {
            format!(
                "cannot decode member `{}` (policy {}): {e}",
                self.member,
                self.policy.name()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    const DEVICE_PUBLISHED: FieldPolicy = FieldPolicy::new("device_published", &["id", "name"]);

    #[derive(Debug, Deserialize, PartialEq)]
    struct Device {
        id: String,
        name: String,
        #[serde(default)]
        data: Option<Value>,
    }

    #[test]
    fn full_policy_keeps_everything() {
        let payload = json!({"device": {"id": "d1", "name": "lamp", "data": {"w": 40}}});
        let device = Extract::<Device>::member("device").decode(&payload).unwrap();
        assert_eq!(device.data, Some(json!({"w": 40})));
    }

    #[test]
    fn field_policy_hides_other_fields() {
        let payload = json!({"device": {"id": "d1", "name": "lamp", "data": {"w": 40}}});
        let device = Extract::<Device>::member("device")
            .with_policy(DEVICE_PUBLISHED)
            .decode(&payload)
            .unwrap();
        assert_eq!(device.name, "lamp");
        assert_eq!(device.data, None);
    }

    #[test]
    fn field_policy_applies_to_array_elements() {
        let payload = json!({"devices": [
            {"id": "d1", "name": "a", "data": 1},
            {"id": "d2", "name": "b", "data": 2},
        ]});
        let devices = Extract::<Vec<Device>>::member("devices")
            .with_policy(DEVICE_PUBLISHED)
            .decode(&payload)
            .unwrap();
        assert_eq!(devices.len(), 2);
        assert!(devices.iter().all(|d| d.data.is_none()));
    }

    #[test]
    fn missing_member_decodes_as_null() {
        let payload = json!({"status": "success"});
        let absent: Option<Device> = Extract::member("device").decode(&payload).unwrap();
        assert!(absent.is_none());
        let err = Extract::<Device>::member("device").decode(&payload).unwrap_err();
        assert!(err.contains("`device`"));
    }

    #[test]
    fn shape_mismatch_names_policy() {
        let payload = json!({"device": {"id": 7}});
        let err = Extract::<Device>::member("device")
            .with_policy(DEVICE_PUBLISHED)
            .decode(&payload)
            .unwrap_err();
        assert!(err.contains("device_published"));
    }

    #[test]
    fn scalars_pass_through_projection() {
        let policy = ExtractionPolicy::Fields(DEVICE_PUBLISHED);
        assert_eq!(policy.project(json!(3)), json!(3));
        assert_eq!(ExtractionPolicy::default().name(), "full");
    }
}
