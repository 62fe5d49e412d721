use std::sync::Arc;

use serde_json::{Value as Json, json};

use crate::error::EventstreamResult;
use crate::event_type::EventType;
use crate::eventstream::{Eventstream, UserId};
use crate::params::{FunctionRegistry, ParamKind, ParamModel, ParamReader, ParamSpec, WidgetDescriptor};
use crate::time::TimeSpan;

use super::{DataProcessor, ProcessorOutput};

/// How lost users are decided.
#[derive(Debug, Clone, PartialEq)]
pub enum LostUsers {
    /// Exactly these users are lost.
    List(Vec<UserId>),
    /// Users inactive for longer than this before the stream's last event are lost.
    Timeout(TimeSpan),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelLostUsersParams {
    pub lost_users: LostUsers,
}

impl ParamModel for LabelLostUsersParams {
    const PROCESSOR: &'static str = "LabelLostUsers";

    fn specs() -> Vec<ParamSpec> {
        vec![
            ParamSpec::optional("timeout", ParamKind::Time),
            ParamSpec::optional("lost_users_list", ParamKind::ListOfIds),
        ]
    }

    fn from_json(value: &Json, functions: &FunctionRegistry) -> EventstreamResult<Self> {
        let r = ParamReader::new(Self::PROCESSOR, value, &Self::specs(), functions)?;
        let lost_users = match (r.time("timeout")?, r.user_ids("lost_users_list")?) {
            (Some(timeout), None) => LostUsers::Timeout(timeout),
            (None, Some(users)) => LostUsers::List(users),
            (Some(_), Some(_)) => {
                return Err(r.fail(
                    "timeout",
                    "timeout and lost_users_list are mutually exclusive",
                ));
            }
            (None, None) => {
                return Err(r.fail("timeout", "either timeout or lost_users_list is required"));
            }
        };
        Ok(Self { lost_users })
    }

    fn to_json(&self) -> Json {
        match &self.lost_users {
            LostUsers::List(users) => json!({ "lost_users_list": users }),
            LostUsers::Timeout(timeout) => json!({ "timeout": timeout }),
        }
    }
}

/// Adds `lost_user` or `absent_user` at each user's last event.
#[derive(Debug, Clone)]
pub struct LabelLostUsers {
    params: LabelLostUsersParams,
}

impl LabelLostUsers {
    pub fn new(params: LabelLostUsersParams) -> Self {
        Self { params }
    }
}

impl From<LabelLostUsersParams> for LabelLostUsers {
    fn from(params: LabelLostUsersParams) -> Self {
        Self::new(params)
    }
}

impl DataProcessor for LabelLostUsers {
    fn name(&self) -> &'static str {
        LabelLostUsersParams::PROCESSOR
    }

    fn params(&self) -> Json {
        self.params.to_json()
    }

    fn widgets(&self) -> Vec<WidgetDescriptor> {
        LabelLostUsersParams::widgets()
    }

    fn transform(&self, input: &Arc<Eventstream>) -> EventstreamResult<ProcessorOutput> {
        let ctx = input.context();
        let mut delta = Eventstream::delta(input);
        let Some((_, max_ts)) = input.time_bounds() else {
            return Ok(ProcessorOutput::Delta(delta.finish()?));
        };
        for path in input.paths() {
            let Some(last) = path.last() else { continue };
            let lost = match &self.params.lost_users {
                LostUsers::List(users) => users.contains(path.user_id),
                LostUsers::Timeout(timeout) => max_ts - last.timestamp > timeout.as_nanos(),
            };
            let tag = if lost {
                EventType::LostUser
            } else {
                EventType::AbsentUser
            };
            delta.insert(last.marker(ctx, tag));
        }
        Ok(ProcessorOutput::Delta(delta.finish()?))
    }
}
