use super::expenses::optional_positive_amount;
use crate::capability::CapabilityContext;
use crate::confirm::{self, Changes, Mutation, Outcome, body, to_json};
use crate::error::{Result, ToolError};
use crate::labels::{GoalStatus, Label, LabelWarnings, label_schema, require_known};
use crate::ledger::LedgerAccess;
use crate::money::{format_dollars, outgoing_pair};
use crate::records::{GoalView, goal_current, goal_target, start_of_day};
use crate::traits::{
    Tool, ToolInvocation, ToolKind, ToolSpec, ToolTier, mutating_schema, optional_date,
    optional_f64, optional_string, parse_page_size, require_string,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use pf_ledger::{Goal, GoalUpdate, ListFilter};
use serde_json::{Map, Value, json};

#[derive(Debug, Default)]
struct GoalArgs {
    name: Option<String>,
    description: Option<String>,
    target_amount: Option<f64>,
    target_date: Option<NaiveDate>,
    status: Option<GoalStatus>,
}

impl GoalArgs {
    fn parse(args: &Value, warnings: &mut LabelWarnings) -> Result<Self> {
        Ok(Self {
            name: optional_string(args, "name")?,
            description: optional_string(args, "description")?,
            target_amount: optional_positive_amount(args, "target_amount")?,
            target_date: optional_date(args, "target_date")?,
            status: warnings.parse(args, "status")?,
        })
    }

    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.target_amount.is_none()
            && self.target_date.is_none()
            && self.status.is_none()
    }
}

fn goal_properties() -> Map<String, Value> {
    let mut props = Map::new();
    props.insert(
        "name".into(),
        json!({"type": "string", "description": "Short goal name, e.g. \"Emergency fund\"."}),
    );
    props.insert(
        "description".into(),
        json!({"type": "string", "description": "Optional longer description."}),
    );
    props.insert(
        "target_amount".into(),
        json!({"type": "number", "description": "Amount to save, in dollars."}),
    );
    props.insert(
        "target_date".into(),
        json!({"type": "string", "description": "Deadline, YYYY-MM-DD."}),
    );
    props.insert(
        "status".into(),
        label_schema::<GoalStatus>("Goal status."),
    );
    props
}

fn describe(g: &Goal) -> String {
    format!(
        "\"{}\" ({} of {} saved)",
        g.name,
        format_dollars(goal_current(g)),
        format_dollars(goal_target(g))
    )
}

pub struct ListGoalsTool {
    ledger: LedgerAccess,
}

impl ListGoalsTool {
    pub fn new(ledger: LedgerAccess) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Tool for ListGoalsTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "list_goals".to_string(),
            description: "List the user's savings goals with progress, optionally filtered by status.".to_string(),
            parameters_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "status": label_schema::<GoalStatus>("Only return goals with this status."),
                    "page_size": { "type": "integer", "minimum": 1, "maximum": 50 },
                    "page_token": { "type": "string" }
                }
            }),
            kind: ToolKind::Read,
            tier: ToolTier::Base,
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, ctx: &CapabilityContext, invocation: &ToolInvocation) -> Result<Value> {
        let args = &invocation.arguments;
        let status = optional_string(args, "status")?
            .map(|raw| require_known::<GoalStatus>(&raw))
            .transpose()?;
        let filter = ListFilter {
            user_id: ctx.user_id().to_string(),
            status: status.map(Label::code),
            page_size: parse_page_size(args)?,
            page_token: optional_string(args, "page_token")?,
            ..ListFilter::default()
        };
        let page = self
            .ledger
            .call("ListGoals", self.ledger.service().list_goals(&filter))
            .await?;
        let goals: Vec<GoalView> = page.items.iter().map(GoalView::from).collect();
        let mut out = json!({
            "goals": goals,
            "count": goals.len(),
            "hasMore": page.has_more(),
        });
        if let Some(token) = page.next_page_token.filter(|t| !t.is_empty()) {
            out["nextPageToken"] = Value::from(token);
        }
        Ok(out)
    }
}

struct CreateGoal<'a> {
    ledger: &'a LedgerAccess,
    goal: Goal,
}

#[async_trait]
impl Mutation for CreateGoal<'_> {
    type Target = ();

    async fn fetch(&self) -> Result<()> {
        Ok(())
    }

    async fn preview(&self, _: &()) -> Result<Outcome> {
        let mut details = to_json(&GoalView::from(&self.goal));
        if let Value::Object(map) = &mut details {
            map.remove("id");
        }
        Ok(Outcome::previewed(
            body([("details", details)]),
            format!(
                "Ready to create goal {}. Confirm to save it.",
                describe(&self.goal)
            ),
        ))
    }

    async fn apply(&self, _: ()) -> Result<Outcome> {
        let created = self
            .ledger
            .call("CreateGoal", self.ledger.service().create_goal(&self.goal))
            .await?;
        Ok(Outcome::executed(
            body([("goal", to_json(&GoalView::from(&created)))]),
            format!("Created goal {}.", describe(&created)),
        ))
    }
}

pub struct CreateGoalTool {
    ledger: LedgerAccess,
}

impl CreateGoalTool {
    pub fn new(ledger: LedgerAccess) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Tool for CreateGoalTool {
    fn spec(&self) -> ToolSpec {
        let mut props = goal_properties();
        props.insert(
            "current_amount".into(),
            json!({"type": "number", "description": "Amount already saved, in dollars. Defaults to 0."}),
        );
        ToolSpec {
            name: "create_goal".to_string(),
            description: "Create a savings goal. First call returns a preview for the user; repeat with confirmed=true after they approve.".to_string(),
            parameters_schema: mutating_schema(props, &["name", "target_amount"]),
            kind: ToolKind::Mutating,
            tier: ToolTier::Base,
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, ctx: &CapabilityContext, invocation: &ToolInvocation) -> Result<Value> {
        let args = &invocation.arguments;
        let mut warnings = LabelWarnings::default();
        let name = require_string(args, "name")?;
        let fields = GoalArgs::parse(args, &mut warnings)?;
        let target = fields.target_amount.ok_or_else(|| {
            ToolError::InvalidArguments("missing key: target_amount".to_string())
        })?;
        let current = optional_f64(args, "current_amount")?.unwrap_or(0.0);
        if current < 0.0 {
            return Err(ToolError::InvalidArguments(
                "current_amount cannot be negative".to_string(),
            ));
        }
        let (target_amount, target_amount_cents) = outgoing_pair(target);
        let (current_amount, current_amount_cents) = outgoing_pair(current);
        let goal = Goal {
            id: String::new(),
            user_id: ctx.user_id().to_string(),
            name,
            description: fields.description.unwrap_or_default(),
            target_amount,
            target_amount_cents,
            current_amount,
            current_amount_cents,
            target_date: fields.target_date.map(start_of_day),
            status: fields.status.unwrap_or(GoalStatus::Active).code(),
        };
        let mutation = CreateGoal {
            ledger: &self.ledger,
            goal,
        };
        Ok(confirm::run(&mutation, invocation.confirmed)
            .await?
            .with_warnings(warnings.into_vec())
            .into_value())
    }
}

struct UpdateGoal<'a> {
    ledger: &'a LedgerAccess,
    user_id: &'a str,
    goal_id: String,
    fields: GoalArgs,
}

impl UpdateGoal<'_> {
    fn changes(&self, current: &Goal) -> Changes {
        let f = &self.fields;
        let mut changes = Changes::default();
        changes.field("name", current.name.clone(), f.name.clone());
        changes.field(
            "description",
            current.description.clone(),
            f.description.clone(),
        );
        changes.field_with(
            "target_amount",
            goal_target(current),
            f.target_amount.map(|a| outgoing_pair(a).0),
            |v| format_dollars(*v),
        );
        changes.field(
            "target_date",
            current.target_date.map(|d| d.format("%Y-%m-%d").to_string()),
            f.target_date.map(|d| Some(d.to_string())),
        );
        changes.field(
            "status",
            GoalStatus::from_code(current.status).label(),
            f.status.map(Label::label),
        );
        changes
    }
}

#[async_trait]
impl Mutation for UpdateGoal<'_> {
    type Target = Goal;

    async fn fetch(&self) -> Result<Goal> {
        self.ledger
            .call(
                "GetGoal",
                self.ledger.service().get_goal(self.user_id, &self.goal_id),
            )
            .await
    }

    async fn preview(&self, current: &Goal) -> Result<Outcome> {
        let changes = self.changes(current);
        let message = format!(
            "Ready to update goal {}: {}. Confirm to apply.",
            describe(current),
            changes.summary()
        );
        Ok(Outcome::previewed(
            body([
                ("goalId", Value::from(self.goal_id.clone())),
                ("current", to_json(&GoalView::from(current))),
                ("changes", changes.into_value()),
            ]),
            message,
        ))
    }

    async fn apply(&self, current: Goal) -> Result<Outcome> {
        let summary = self.changes(&current).summary();
        let f = &self.fields;
        let pair = f.target_amount.map(outgoing_pair);
        let update = GoalUpdate {
            user_id: self.user_id.to_string(),
            goal_id: self.goal_id.clone(),
            name: f.name.clone(),
            description: f.description.clone(),
            target_amount: pair.map(|(dollars, _)| dollars),
            target_amount_cents: pair.map(|(_, cents)| cents),
            target_date: f.target_date.map(start_of_day),
            status: f.status.map(Label::code),
        };
        let updated = self
            .ledger
            .call("UpdateGoal", self.ledger.service().update_goal(&update))
            .await?;
        Ok(Outcome::executed(
            body([("goal", to_json(&GoalView::from(&updated)))]),
            format!("Updated goal \"{}\": {summary}.", updated.name),
        ))
    }
}

pub struct UpdateGoalTool {
    ledger: LedgerAccess,
}

impl UpdateGoalTool {
    pub fn new(ledger: LedgerAccess) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Tool for UpdateGoalTool {
    fn spec(&self) -> ToolSpec {
        let mut props = goal_properties();
        props.insert(
            "goal_id".into(),
            json!({"type": "string", "description": "Id of the goal to change."}),
        );
        ToolSpec {
            name: "update_goal".to_string(),
            description: "Change a savings goal. Pass only the fields that change. First call returns a from/to preview; repeat with confirmed=true after the user approves.".to_string(),
            parameters_schema: mutating_schema(props, &["goal_id"]),
            kind: ToolKind::Mutating,
            tier: ToolTier::Base,
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, ctx: &CapabilityContext, invocation: &ToolInvocation) -> Result<Value> {
        let args = &invocation.arguments;
        let mut warnings = LabelWarnings::default();
        let goal_id = require_string(args, "goal_id")?;
        let fields = GoalArgs::parse(args, &mut warnings)?;
        if fields.is_empty() {
            return Err(ToolError::InvalidArguments(
                "provide at least one field to change".to_string(),
            ));
        }
        let mutation = UpdateGoal {
            ledger: &self.ledger,
            user_id: ctx.user_id(),
            goal_id,
            fields,
        };
        Ok(confirm::run(&mutation, invocation.confirmed)
            .await?
            .with_warnings(warnings.into_vec())
            .into_value())
    }
}

struct DeleteGoal<'a> {
    ledger: &'a LedgerAccess,
    user_id: &'a str,
    goal_id: String,
}

#[async_trait]
impl Mutation for DeleteGoal<'_> {
    type Target = Goal;

    async fn fetch(&self) -> Result<Goal> {
        self.ledger
            .call(
                "GetGoal",
                self.ledger.service().get_goal(self.user_id, &self.goal_id),
            )
            .await
    }

    async fn preview(&self, current: &Goal) -> Result<Outcome> {
        Ok(Outcome::previewed(
            body([("goal", to_json(&GoalView::from(current)))]),
            format!(
                "This will permanently delete goal {}. Confirm to delete it.",
                describe(current)
            ),
        ))
    }

    async fn apply(&self, current: Goal) -> Result<Outcome> {
        self.ledger
            .call(
                "DeleteGoal",
                self.ledger.service().delete_goal(self.user_id, &self.goal_id),
            )
            .await?;
        Ok(Outcome::executed(
            body([("deletedId", Value::from(self.goal_id.clone()))]),
            format!("Deleted goal {}.", describe(&current)),
        ))
    }
}

pub struct DeleteGoalTool {
    ledger: LedgerAccess,
}

impl DeleteGoalTool {
    pub fn new(ledger: LedgerAccess) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Tool for DeleteGoalTool {
    fn spec(&self) -> ToolSpec {
        let mut props = Map::new();
        props.insert(
            "goal_id".into(),
            json!({"type": "string", "description": "Id of the goal to delete."}),
        );
        ToolSpec {
            name: "delete_goal".to_string(),
            description: "Delete a savings goal. First call shows what will be removed; repeat with confirmed=true after the user approves.".to_string(),
            parameters_schema: mutating_schema(props, &["goal_id"]),
            kind: ToolKind::Mutating,
            tier: ToolTier::Base,
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, ctx: &CapabilityContext, invocation: &ToolInvocation) -> Result<Value> {
        let mutation = DeleteGoal {
            ledger: &self.ledger,
            user_id: ctx.user_id(),
            goal_id: require_string(&invocation.arguments, "goal_id")?,
        };
        Ok(confirm::run(&mutation, invocation.confirmed).await?.into_value())
    }
}
