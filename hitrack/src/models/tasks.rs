// Background (celery) task records

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TaskResult {
    pub task_id: String,
    pub task_name: String,
    pub status: String,
    pub result_summary: Option<Value>,
    pub duration: Option<f64>,
    pub created: String,
    pub updated: Option<String>,
    pub traceback: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TaskResultList {
    pub task_id: String,
    pub task_name: String,
    pub status: String,
    pub duration: Option<f64>,
    pub created: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TaskStatistics {
    pub total_tasks: u64,
    pub successful_tasks: u64,
    pub failed_tasks: u64,
    pub pending_tasks: u64,
    pub running_tasks: u64,
    pub average_duration: f64,
    #[serde(default)]
    pub recent_tasks: Vec<TaskResultList>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TaskTypeStats {
    pub task_name: String,
    pub total: u64,
    pub success: u64,
    pub failure: u64,
    pub pending: u64,
    pub running: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TaskDetails {
    pub task_id: String,
    pub task_name: String,
    pub status: String,
    pub created: String,
    pub updated: Option<String>,
    pub duration: Option<f64>,
    pub result: Option<Value>,
    pub traceback: Option<String>,
    pub meta: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    Interval,
    Crontab,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ScheduleInfo {
    #[serde(rename = "type")]
    pub kind: ScheduleType,
    pub every: Option<u64>,
    pub period: Option<String>,
    pub minute: Option<String>,
    pub hour: Option<String>,
    pub day_of_week: Option<String>,
    pub day_of_month: Option<String>,
    pub month_of_year: Option<String>,
}

impl ScheduleInfo {
    /// Short human-readable schedule, eg "every 6 hours" or "cron 0 3 * * *"
    pub fn describe(&self) -> String {
        match self.kind {
            ScheduleType::Interval => format!(
                "every {} {}",
                self.every.unwrap_or(1),
                self.period.as_deref().unwrap_or("?")
            ),
            ScheduleType::Crontab => format!(
                "cron {} {} {} {} {}",
                self.minute.as_deref().unwrap_or("*"),
                self.hour.as_deref().unwrap_or("*"),
                self.day_of_month.as_deref().unwrap_or("*"),
                self.month_of_year.as_deref().unwrap_or("*"),
                self.day_of_week.as_deref().unwrap_or("*"),
            ),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PeriodicTask {
    pub id: u64,
    pub name: String,
    pub task: String,
    pub enabled: bool,
    pub schedule_info: Option<ScheduleInfo>,
    pub next_run: Option<String>,
    pub last_run_at: Option<String>,
    #[serde(default)]
    pub total_run_count: u64,
}

#[test]
fn test_schedule_describe() {
    let task: PeriodicTask = serde_json::from_str(
        r#"{
            "id": 3,
            "name": "refresh-epss",
            "task": "core.tasks.update_epss",
            "enabled": true,
            "schedule_info": {"type": "crontab", "minute": "0", "hour": "3"},
            "total_run_count": 12
        }"#,
    )
    .unwrap();
    assert_eq!(
        task.schedule_info.unwrap().describe(),
        "cron 0 3 * * *"
    );

    let interval = ScheduleInfo {
        kind: ScheduleType::Interval,
        every: Some(6),
        period: Some("hours".to_string()),
        minute: None,
        hour: None,
        day_of_week: None,
        day_of_month: None,
        month_of_year: None,
    };
    assert_eq!(interval.describe(), "every 6 hours");
}
