//! Localized console strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Language of the system prompt and console output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Lang {
    #[default]
    #[serde(rename = "cn", alias = "zh")]
    Cn,
    #[serde(rename = "en")]
    En,
}

impl Lang {
    pub fn code(&self) -> &'static str {
        match self {
            Lang::Cn => "cn",
            Lang::En => "en",
        }
    }
}

impl FromStr for Lang {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cn" | "zh" | "zh-cn" => Ok(Lang::Cn),
            "en" | "en-us" => Ok(Lang::En),
            other => Err(format!("unsupported language: {}", other)),
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// UI messages structure
#[derive(Debug, Clone)]
pub struct Messages {
    pub thinking: &'static str,
    pub action: &'static str,
    pub task_completed: &'static str,
    pub step: &'static str,
    pub task: &'static str,
    pub result: &'static str,
    pub confirmation_required: &'static str,
    pub continue_prompt: &'static str,
    pub manual_operation_required: &'static str,
    pub press_enter_when_done: &'static str,
    pub enter_task: &'static str,
    pub supported_apps: &'static str,
}

static MESSAGES_CN: Messages = Messages {
    thinking: "思考过程",
    action: "执行动作",
    task_completed: "任务完成",
    step: "步骤",
    task: "任务",
    result: "结果",
    confirmation_required: "需要确认",
    continue_prompt: "是否继续？(y/n)",
    manual_operation_required: "需要人工操作",
    press_enter_when_done: "完成后按回车继续",
    enter_task: "请输入任务 (quit 退出)",
    supported_apps: "支持的应用",
};

static MESSAGES_EN: Messages = Messages {
    thinking: "Thinking",
    action: "Action",
    task_completed: "Task Completed",
    step: "Step",
    task: "Task",
    result: "Result",
    confirmation_required: "Confirmation Required",
    continue_prompt: "Continue? (y/n)",
    manual_operation_required: "Manual Operation Required",
    press_enter_when_done: "Press Enter when done",
    enter_task: "Enter a task (quit to exit)",
    supported_apps: "Supported apps",
};

/// Get UI messages by language.
pub fn get_messages(lang: Lang) -> &'static Messages {
    match lang {
        Lang::Cn => &MESSAGES_CN,
        Lang::En => &MESSAGES_EN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_messages() {
        assert_eq!(get_messages(Lang::Cn).thinking, "思考过程");
        assert_eq!(get_messages(Lang::En).thinking, "Thinking");
    }

    #[test]
    fn test_lang_parse_and_serde() {
        assert_eq!("zh".parse::<Lang>(), Ok(Lang::Cn));
        assert_eq!("EN".parse::<Lang>(), Ok(Lang::En));
        assert!("fr".parse::<Lang>().is_err());
        assert_eq!(serde_json::to_string(&Lang::Cn).unwrap(), "\"cn\"");
        assert_eq!(serde_json::from_str::<Lang>("\"zh\"").unwrap(), Lang::Cn);
    }
}
