//! Plan documents for tests.
//!
//! ```
//! use plan_registry_testing::fixtures::{association, plan};
//!
//! let value = plan("P1", true, vec![association("A1", true, true), association("A2", false, false)]);
//! assert_eq!(value["linkedPlanServices"][0]["linkedService"]["objectId"], "S-A1");
//! ```

use serde_json::{Value, json};

/// Organisation used by every fixture.
pub const ORG: &str = "example.com";

/// A cost share.
#[must_use]
pub fn cost_share(object_id: &str, deductible: i64, copay: i64) -> Value {
    json!({
        "objectId": object_id,
        "objectType": "membercostshare",
        "_org": ORG,
        "deductible": deductible,
        "copay": copay
    })
}

/// An association; its service is `S-{id}` and its cost share `CS-{id}`.
#[must_use]
pub fn association(object_id: &str, with_service: bool, with_cost_share: bool) -> Value {
    let mut value = json!({ "objectId": object_id, "objectType": "planservice", "_org": ORG });
    if with_service {
        value["linkedService"] = json!({
            "objectId": format!("S-{object_id}"),
            "objectType": "service",
            "_org": ORG,
            "name": "Yearly physical"
        });
    }
    if with_cost_share {
        value["planserviceCostShares"] = cost_share(&format!("CS-{object_id}"), 10, 0);
    }
    value
}

/// A plan; its root cost share is `C-{id}`.
#[must_use]
pub fn plan(object_id: &str, with_cost_share: bool, associations: Vec<Value>) -> Value {
    let mut value = json!({
        "objectId": object_id,
        "objectType": "plan",
        "_org": ORG,
        "planType": "inNetwork",
        "creationDate": "12-12-2017",
        "linkedPlanServices": associations
    });
    if with_cost_share {
        value["planCostShares"] = cost_share(&format!("C-{object_id}"), 2000, 23);
    }
    value
}

/// `P1` with root cost share `C1`, association `A1` (service `S1`, cost
/// share `CS1`) and a bare association `A2`: six entities in total.
#[must_use]
pub fn scenario_plan() -> Value {
    json!({
        "objectId": "P1",
        "objectType": "plan",
        "_org": ORG,
        "planType": "inNetwork",
        "creationDate": "12-12-2017",
        "planCostShares": cost_share("C1", 2000, 23),
        "linkedPlanServices": [
            {
                "objectId": "A1",
                "objectType": "planservice",
                "_org": ORG,
                "linkedService": {
                    "objectId": "S1",
                    "objectType": "service",
                    "_org": ORG,
                    "name": "Yearly physical"
                },
                "planserviceCostShares": cost_share("CS1", 10, 0)
            },
            { "objectId": "A2", "objectType": "planservice", "_org": ORG }
        ]
    })
}
