use std::collections::BTreeMap;

use handlebars::{Handlebars, Template, no_escape};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::{
    error::TemplateError,
    models::{
        channel::Channel,
        template::{RenderedContent, TemplateSource},
    },
};

/// Renders channel content from Handlebars templates keyed by (template id, channel).
///
/// Email HTML goes through an escaping registry; subjects, text bodies, SMS and push go
/// through a non-escaping one. Both registries are non-strict, so a variable missing from
/// the payload renders as an empty string. Rendering is pure: same input, same output.
pub struct TemplateRenderer {
    html: Handlebars<'static>,
    plain: Handlebars<'static>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    /// An empty renderer with no templates registered.
    pub fn new() -> Self {
        let html = Handlebars::new();
        let mut plain = Handlebars::new();
        plain.register_escape_fn(no_escape);

        Self { html, plain }
    }

    /// A renderer preloaded with the built-in template of every event kind.
    pub fn with_builtin() -> Result<Self, TemplateError> {
        let mut renderer = Self::new();
        let templates = builtin_templates();
        let count = templates.len();

        for (template_id, source) in templates {
            renderer.register(template_id, source)?;
        }

        info!(count, "Built-in templates registered");
        Ok(renderer)
    }

    /// Registers (or replaces) the `source.channel()` variant of `template_id`.
    ///
    /// All parts are compiled before any is registered, so a parse error leaves the
    /// previous variant untouched.
    pub fn register(&mut self, template_id: &str, source: TemplateSource) -> Result<(), TemplateError> {
        let channel = source.channel();
        let compile = |part: &str, src: &str| {
            Template::compile(src).map_err(|e| TemplateError::Render {
                template_id: template_id.to_string(),
                channel,
                reason: format!("{} does not parse: {}", part, e),
            })
        };

        match &source {
            TemplateSource::Email {
                subject,
                html,
                text,
            } => {
                let subject = compile("subject", subject)?;
                let html = compile("html", html)?;
                let text = compile("text", text)?;
                self.plain
                    .register_template(&part_name(template_id, channel, "subject"), subject);
                self.html
                    .register_template(&part_name(template_id, channel, "html"), html);
                self.plain
                    .register_template(&part_name(template_id, channel, "text"), text);
            }
            TemplateSource::Sms { body } => {
                let body = compile("body", body)?;
                self.plain
                    .register_template(&part_name(template_id, channel, "body"), body);
            }
            TemplateSource::Push { title, body } => {
                let title = compile("title", title)?;
                let body = compile("body", body)?;
                self.plain
                    .register_template(&part_name(template_id, channel, "title"), title);
                self.plain
                    .register_template(&part_name(template_id, channel, "body"), body);
            }
        }

        debug!(template_id, channel = %channel, "Template registered");
        Ok(())
    }

    pub fn has_template(&self, template_id: &str, channel: Channel) -> bool {
        let marker = match channel {
            Channel::Email => "subject",
            Channel::Sms => "body",
            Channel::Push => "title",
        };
        self.plain
            .has_template(&part_name(template_id, channel, marker))
    }

    pub fn render(
        &self,
        template_id: &str,
        channel: Channel,
        data: &Map<String, Value>,
    ) -> Result<RenderedContent, TemplateError> {
        if !self.has_template(template_id, channel) {
            return Err(TemplateError::NotFound {
                template_id: template_id.to_string(),
                channel,
            });
        }

        debug!(
            template_id,
            channel = %channel,
            variable_count = data.len(),
            "Rendering template"
        );

        let content = match channel {
            Channel::Email => RenderedContent::Email {
                subject: self.render_part(&self.plain, template_id, channel, "subject", data)?,
                html: self.render_part(&self.html, template_id, channel, "html", data)?,
                text: self.render_part(&self.plain, template_id, channel, "text", data)?,
            },
            Channel::Sms => RenderedContent::Sms {
                body: self.render_part(&self.plain, template_id, channel, "body", data)?,
            },
            Channel::Push => RenderedContent::Push {
                title: self.render_part(&self.plain, template_id, channel, "title", data)?,
                body: self.render_part(&self.plain, template_id, channel, "body", data)?,
                data: BTreeMap::from([("template".to_string(), template_id.to_string())]),
            },
        };

        Ok(content)
    }

    fn render_part(
        &self,
        registry: &Handlebars<'static>,
        template_id: &str,
        channel: Channel,
        part: &str,
        data: &Map<String, Value>,
    ) -> Result<String, TemplateError> {
        let rendered = registry
            .render(&part_name(template_id, channel, part), data)
            .map_err(|e| TemplateError::Render {
                template_id: template_id.to_string(),
                channel,
                reason: e.to_string(),
            })?;

        Ok(match channel {
            Channel::Email if part == "html" => rendered,
            _ => rendered.trim().to_string(),
        })
    }
}

fn part_name(template_id: &str, channel: Channel, part: &str) -> String {
    format!("{}.{}.{}", template_id, channel, part)
}

fn builtin_templates() -> Vec<(&'static str, TemplateSource)> {
    vec![
        (
            "account_verification",
            TemplateSource::email(
                "Confirm your {{app_name}} account",
                include_str!("../templates/account_verification.html.hbs"),
                include_str!("../templates/account_verification.txt.hbs"),
            ),
        ),
        (
            "account_verification",
            TemplateSource::sms("{{app_name}}: confirm your account at {{verification_link}}"),
        ),
        (
            "account_verification",
            TemplateSource::push(
                "Verify your account",
                "Please verify your account to unlock every {{app_name}} feature.",
            ),
        ),
        (
            "password_reset",
            TemplateSource::email(
                "Reset your {{app_name}} password",
                include_str!("../templates/password_reset.html.hbs"),
                include_str!("../templates/password_reset.txt.hbs"),
            ),
        ),
        (
            "password_reset",
            TemplateSource::sms(
                "{{app_name}}: your password reset code is {{code}}. It expires in {{expires_in_minutes}} minutes. Never share it.",
            ),
        ),
        (
            "password_reset",
            TemplateSource::push(
                "Password reset requested",
                "A password reset was requested for your {{app_name}} account.",
            ),
        ),
        (
            "subscription_started",
            TemplateSource::email(
                "Your {{plan_name}} subscription is active",
                include_str!("../templates/subscription_started.html.hbs"),
                include_str!("../templates/subscription_started.txt.hbs"),
            ),
        ),
        (
            "subscription_started",
            TemplateSource::sms(
                "{{app_name}}: your {{plan_name}} subscription is active! Enjoy every premium feature now.",
            ),
        ),
        (
            "subscription_started",
            TemplateSource::push(
                "Subscription active",
                "Your {{plan_name}} subscription is now active.",
            ),
        ),
        (
            "subscription_ended",
            TemplateSource::email(
                "Your {{plan_name}} subscription has ended",
                include_str!("../templates/subscription_ended.html.hbs"),
                include_str!("../templates/subscription_ended.txt.hbs"),
            ),
        ),
        (
            "subscription_ended",
            TemplateSource::sms(
                "{{app_name}}: your {{plan_name}} subscription has expired. Renew it on our website to keep your benefits.",
            ),
        ),
        (
            "subscription_ended",
            TemplateSource::push(
                "Subscription ended",
                "Your {{plan_name}} subscription has ended.",
            ),
        ),
        (
            "invoice",
            TemplateSource::email(
                "Your {{app_name}} invoice {{invoice_number}}",
                include_str!("../templates/invoice.html.hbs"),
                include_str!("../templates/invoice.txt.hbs"),
            ),
        ),
        (
            "payment_failed",
            TemplateSource::email(
                "Payment failed for your {{plan_name}} subscription",
                include_str!("../templates/payment_failed.html.hbs"),
                include_str!("../templates/payment_failed.txt.hbs"),
            ),
        ),
        (
            "ai_result",
            TemplateSource::push(
                "AI result available",
                "Your {{result_type}} is now available.",
            ),
        ),
    ]
}
