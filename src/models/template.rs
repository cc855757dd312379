use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::channel::Channel;

/// Channel-shaped output of a render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "lowercase")]
pub enum RenderedContent {
    Email {
        subject: String,
        html: String,
        text: String,
    },
    Sms {
        body: String,
    },
    Push {
        title: String,
        body: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        data: BTreeMap<String, String>,
    },
}

impl RenderedContent {
    pub fn channel(&self) -> Channel {
        match self {
            RenderedContent::Email { .. } => Channel::Email,
            RenderedContent::Sms { .. } => Channel::Sms,
            RenderedContent::Push { .. } => Channel::Push,
        }
    }
}

/// Raw Handlebars sources for one (template id, channel) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    Email {
        subject: String,
        html: String,
        text: String,
    },
    Sms {
        body: String,
    },
    Push {
        title: String,
        body: String,
    },
}

impl TemplateSource {
    pub fn channel(&self) -> Channel {
        match self {
            TemplateSource::Email { .. } => Channel::Email,
            TemplateSource::Sms { .. } => Channel::Sms,
            TemplateSource::Push { .. } => Channel::Push,
        }
    }

    pub fn email(subject: &str, html: &str, text: &str) -> Self {
        TemplateSource::Email {
            subject: subject.to_string(),
            html: html.to_string(),
            text: text.to_string(),
        }
    }

    pub fn sms(body: &str) -> Self {
        TemplateSource::Sms {
            body: body.to_string(),
        }
    }

    pub fn push(title: &str, body: &str) -> Self {
        TemplateSource::Push {
            title: title.to_string(),
            body: body.to_string(),
        }
    }
}
