use std::sync::Arc;

use serde_json::{Value as Json, json};

use crate::error::EventstreamResult;
use crate::event_type::EventType;
use crate::eventstream::{Eventstream, UserId};
use crate::params::{FunctionRegistry, ParamKind, ParamModel, ParamReader, ParamSpec, WidgetDescriptor};

use super::{DataProcessor, ProcessorOutput};

/// Users considered new.
#[derive(Debug, Clone, PartialEq)]
pub enum NewUsers {
    All,
    List(Vec<UserId>),
}

impl NewUsers {
    fn contains(&self, user: &UserId) -> bool {
        match self {
            NewUsers::All => true,
            NewUsers::List(users) => users.contains(user),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelNewUsersParams {
    pub new_users_list: NewUsers,
}

impl ParamModel for LabelNewUsersParams {
    const PROCESSOR: &'static str = "LabelNewUsers";

    fn specs() -> Vec<ParamSpec> {
        vec![ParamSpec::required("new_users_list", ParamKind::ListOfIds)]
    }

    fn from_json(value: &Json, functions: &FunctionRegistry) -> EventstreamResult<Self> {
        let r = ParamReader::new(Self::PROCESSOR, value, &Self::specs(), functions)?;
        let new_users_list = match r.raw("new_users_list") {
            Some(Json::String(s)) if s == "all" => NewUsers::All,
            Some(Json::String(s)) => {
                return Err(r.fail(
                    "new_users_list",
                    format!("expected a list of user ids or \"all\", got \"{s}\""),
                ));
            }
            Some(_) => NewUsers::List(r.require("new_users_list", r.user_ids("new_users_list")?)?),
            None => return Err(r.fail("new_users_list", "missing required field")),
        };
        Ok(Self { new_users_list })
    }

    fn to_json(&self) -> Json {
        match &self.new_users_list {
            NewUsers::All => json!({ "new_users_list": "all" }),
            NewUsers::List(users) => json!({ "new_users_list": users }),
        }
    }
}

/// Adds `new_user` or `existing_user` at each user's first event.
#[derive(Debug, Clone)]
pub struct LabelNewUsers {
    params: LabelNewUsersParams,
}

impl LabelNewUsers {
    pub fn new(params: LabelNewUsersParams) -> Self {
        Self { params }
    }
}

impl From<LabelNewUsersParams> for LabelNewUsers {
    fn from(params: LabelNewUsersParams) -> Self {
        Self::new(params)
    }
}

impl DataProcessor for LabelNewUsers {
    fn name(&self) -> &'static str {
        LabelNewUsersParams::PROCESSOR
    }

    fn params(&self) -> Json {
        self.params.to_json()
    }

    fn widgets(&self) -> Vec<WidgetDescriptor> {
        LabelNewUsersParams::widgets()
    }

    fn transform(&self, input: &Arc<Eventstream>) -> EventstreamResult<ProcessorOutput> {
        let ctx = input.context();
        let mut delta = Eventstream::delta(input);
        for path in input.paths() {
            let Some(first) = path.first() else { continue };
            let tag = if self.params.new_users_list.contains(path.user_id) {
                EventType::NewUser
            } else {
                EventType::ExistingUser
            };
            delta.insert(first.marker(ctx, tag));
        }
        Ok(ProcessorOutput::Delta(delta.finish()?))
    }
}
