//! Minimal TwiML (voice markup) rendering.
//!
//! Just enough of the provider's response grammar for this service: `<Say>`,
//! `<Gather>` (digits or speech), `<Redirect>`, `<Hangup>`. Everything is
//! emitted as escaped XML; the dialog layer never sees markup.

use crate::dialog::{DialogReply, GatherKind};

const PROMPT_TIMEOUT_SECS: u8 = 5;

#[derive(Debug, Clone)]
enum Element {
    Say(String),
    Gather {
        kind: GatherKind,
        action: String,
        prompt: String,
    },
    Redirect(String),
    Hangup,
}

/// Builder for one voice response document.
#[derive(Debug, Clone, Default)]
pub struct VoiceResponse {
    elements: Vec<Element>,
}

impl VoiceResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn say(mut self, text: &str) -> Self {
        self.elements.push(Element::Say(text.to_string()));
        self
    }

    pub fn gather(mut self, kind: GatherKind, action: &str, prompt: &str) -> Self {
        self.elements.push(Element::Gather {
            kind,
            action: action.to_string(),
            prompt: prompt.to_string(),
        });
        self
    }

    pub fn redirect(mut self, action: &str) -> Self {
        self.elements.push(Element::Redirect(action.to_string()));
        self
    }

    pub fn hangup(mut self) -> Self {
        self.elements.push(Element::Hangup);
        self
    }

    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>");
        for element in &self.elements {
            match element {
                Element::Say(text) => {
                    xml.push_str(&format!("<Say>{}</Say>", escape(text)));
                }
                Element::Gather {
                    kind,
                    action,
                    prompt,
                } => {
                    let attrs = match kind {
                        GatherKind::Digits => format!(
                            "numDigits=\"1\" action=\"{}\" method=\"POST\" timeout=\"{PROMPT_TIMEOUT_SECS}\"",
                            escape(action)
                        ),
                        GatherKind::Speech => format!(
                            "input=\"speech\" action=\"{}\" method=\"POST\" language=\"en-US\" timeout=\"{PROMPT_TIMEOUT_SECS}\"",
                            escape(action)
                        ),
                    };
                    xml.push_str(&format!(
                        "<Gather {attrs}><Say>{}</Say></Gather>",
                        escape(prompt)
                    ));
                }
                Element::Redirect(action) => {
                    xml.push_str(&format!(
                        "<Redirect method=\"POST\">{}</Redirect>",
                        escape(action)
                    ));
                }
                Element::Hangup => xml.push_str("<Hangup/>"),
            }
        }
        xml.push_str("</Response>");
        xml
    }
}

/// Render a dialog reply into a complete voice response document.
///
/// Ordering matters for the provider: spoken lines first, then the gather;
/// elements after the gather only execute when no input arrives.
pub fn render_reply(reply: &DialogReply) -> String {
    let mut response = VoiceResponse::new();

    for line in &reply.say {
        response = response.say(line);
    }

    if let Some(gather) = &reply.gather {
        if let Some(action) = gather.next.action_path() {
            response = response.gather(gather.kind, &action, &gather.prompt);
        }
    }

    if let Some(step) = reply.redirect {
        if let Some(action) = step.action_path() {
            response = response.redirect(&action);
        }
    }

    for line in &reply.closing {
        response = response.say(line);
    }

    if reply.hangup {
        response = response.hangup();
    }

    response.to_xml()
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}
