//! Wire types exchanged with the REST API and the comment hub.
//!
//! These are the shapes the orchestration call sites move around, not a full
//! domain model; the server owns validation and the rest of the schema.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type QuestionId = u64;
pub type TemplateId = u64;

/// One answer to one question. Exactly one field is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub int_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bool_value: Option<bool>,
}

impl Answer {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            string_value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn integer(value: i64) -> Self {
        Self {
            int_value: Some(value),
            ..Self::default()
        }
    }

    pub fn flag(value: bool) -> Self {
        Self {
            bool_value: Some(value),
            ..Self::default()
        }
    }
}

/// A filled-in form. `id` is `None` until the server has stored it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormAnswers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub template_id: TemplateId,
    #[serde(default)]
    pub answers: BTreeMap<QuestionId, Answer>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeState {
    pub count: u64,
    pub liked: bool,
}

impl LikeState {
    /// The state after the current user toggles their like.
    pub fn toggled(self) -> Self {
        if self.liked {
            Self {
                count: self.count.saturating_sub(1),
                liked: false,
            }
        } else {
            Self {
                count: self.count + 1,
                liked: true,
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TemplateId>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub likes: LikeState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: u64,
    pub template_id: TemplateId,
    pub author: String,
    pub text: String,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn answers_use_camel_case_and_string_keys() {
        let mut form = FormAnswers {
            template_id: 4,
            ..FormAnswers::default()
        };
        form.answers.insert(1, Answer::text("x"));
        form.answers.insert(2, Answer::flag(true));

        let json = serde_json::to_value(&form).unwrap();
        assert_eq!(
            json,
            json!({
                "templateId": 4,
                "answers": {"1": {"stringValue": "x"}, "2": {"boolValue": true}}
            })
        );

        let back: FormAnswers = serde_json::from_value(json).unwrap();
        assert_eq!(back, form);
    }

    #[test]
    fn like_toggle_is_symmetric() {
        let initial = LikeState {
            count: 4,
            liked: false,
        };
        let liked = initial.toggled();
        assert_eq!(liked, LikeState { count: 5, liked: true });
        assert_eq!(liked.toggled(), initial);
    }

    #[test]
    fn role_defaults_to_user() {
        let user: UserProfile = serde_json::from_value(json!({"id": 1, "name": "n"})).unwrap();
        assert_eq!(user.role, Role::User);
    }
}
