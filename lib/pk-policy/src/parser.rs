//! The `.policy` XML parser: a streaming, stack-based state machine
//! bounded at [`PARSER_MAX_DEPTH`] elements, mirroring the upstream
//! `ParserData`/`state_stack` approach in `polkit-policy-file.c` but on
//! top of `quick-xml`'s pull API instead of hand-rolled expat callbacks.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use pk_identity::{validate_icon_name, ActionId, Decision};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::PolicyLoadError;
use crate::model::{ActionDecl, Defaults, Diagnostic, LocalizedText};

/// Bound on element nesting, per `spec.md` §4.2.
pub const PARSER_MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Top,
    PolicyConfig,
    GlobalVendor,
    GlobalVendorUrl,
    GlobalIconName,
    Action,
    Description,
    Message,
    ActionVendor,
    ActionVendorUrl,
    ActionIconName,
    DefaultsBlock,
    AllowAny,
    AllowInactive,
    AllowActive,
    Annotate,
    /// Anything not recognised. Its children are also unknown, but we
    /// still track them on the stack so depth bounding keeps working and
    /// so a `</matching-close>` doesn't desync us.
    Unknown,
}

#[derive(Default)]
struct ActionBuilder {
    id: String,
    description: LocalizedText,
    message: LocalizedText,
    vendor: Option<String>,
    vendor_url: Option<String>,
    icon_name: Option<String>,
    allow_any: Option<Decision>,
    allow_inactive: Option<Decision>,
    allow_active: Option<Decision>,
    annotations: BTreeMap<String, String>,
}

/// Parses the contents of one `.policy` file into its declared actions
/// plus any non-fatal diagnostics. `file` is only used for error messages
/// and to stamp [`ActionDecl::source_file`].
pub fn parse_policy_file(file: &Path, contents: &str) -> Result<(Vec<ActionDecl>, Vec<Diagnostic>), PolicyLoadError> {
    let mut reader = Reader::from_str(contents);

    let mut stack: Vec<State> = Vec::new();
    let mut diagnostics = Vec::new();
    let mut actions = Vec::new();

    let mut global_vendor: Option<String> = None;
    let mut global_vendor_url: Option<String> = None;
    let mut global_icon_name: Option<String> = None;

    let mut current_action: Option<ActionBuilder> = None;
    let mut current_lang: Option<String> = None;
    let mut current_annotate_key: Option<String> = None;
    let mut text_buf = String::new();

    loop {
        let event = reader.read_event().map_err(|source| PolicyLoadError::MalformedXml { file: file.to_path_buf(), source })?;
        match event {
            Event::Eof => break,
            Event::Start(e) => {
                open_element(&e, file, &mut stack, &mut current_action, &mut current_lang, &mut current_annotate_key, &mut diagnostics)?;
                text_buf.clear();
            },
            Event::Empty(e) => {
                let state = open_element(&e, file, &mut stack, &mut current_action, &mut current_lang, &mut current_annotate_key, &mut diagnostics)?;
                text_buf.clear();
                finish_element(&state, file, &mut stack, &mut text_buf, &mut current_lang, &mut current_annotate_key, &mut current_action, &mut actions, &mut global_vendor, &mut global_vendor_url, &mut global_icon_name)?;
            },
            Event::End(_) => {
                let state = stack.last().cloned().unwrap_or(State::Top);
                finish_element(&state, file, &mut stack, &mut text_buf, &mut current_lang, &mut current_annotate_key, &mut current_action, &mut actions, &mut global_vendor, &mut global_vendor_url, &mut global_icon_name)?;
            },
            Event::Text(t) => {
                text_buf.push_str(&t.unescape().map_err(|source| PolicyLoadError::MalformedXml { file: file.to_path_buf(), source })?);
            },
            _ => {},
        }
    }

    Ok((actions, diagnostics))
}

/// Common handling for both `Event::Start` and `Event::Empty`: classifies
/// the element against the current stack top, records per-element
/// attributes, pushes the new frame, and returns the state that was
/// pushed so the caller can immediately close it again for `Empty`.
#[allow(clippy::too_many_arguments)]
fn open_element(
    e: &quick_xml::events::BytesStart<'_>,
    file: &Path,
    stack: &mut Vec<State>,
    current_action: &mut Option<ActionBuilder>,
    current_lang: &mut Option<String>,
    current_annotate_key: &mut Option<String>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<State, PolicyLoadError> {
    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();

    if stack.len() >= PARSER_MAX_DEPTH {
        return Err(PolicyLoadError::DepthOverflow { file: file.to_path_buf() });
    }

    let parent = stack.last().cloned().unwrap_or(State::Top);
    let state = classify(&parent, &name);

    if matches!(state, State::Action) {
        let id = attr(e, b"id").ok_or_else(|| PolicyLoadError::MissingActionId { file: file.to_path_buf() })?;
        *current_action = Some(ActionBuilder { id, ..Default::default() });
    }
    if matches!(state, State::Description | State::Message) {
        *current_lang = attr(e, b"xml:lang").or_else(|| attr(e, b"lang"));
    }
    if matches!(state, State::Annotate) {
        *current_annotate_key = attr(e, b"key");
    }
    if matches!(state, State::Unknown) {
        diagnostics.push(Diagnostic { file: file.to_path_buf(), message: format!("skipping unrecognised element <{name}>") });
    }

    stack.push(state.clone());
    Ok(state)
}

fn attr(e: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes().filter_map(|a| a.ok()).find(|a| a.key.as_ref() == key).map(|a| String::from_utf8_lossy(&a.value).to_string())
}

fn classify(parent: &State, name: &str) -> State {
    use State::*;
    match (parent, name) {
        (Top, "policyconfig") => PolicyConfig,
        (PolicyConfig, "vendor") => GlobalVendor,
        (PolicyConfig, "vendor_url") => GlobalVendorUrl,
        (PolicyConfig, "icon_name") => GlobalIconName,
        (PolicyConfig, "action") => Action,
        (Action, "description") => Description,
        (Action, "message") => Message,
        (Action, "vendor") => ActionVendor,
        (Action, "vendor_url") => ActionVendorUrl,
        (Action, "icon_name") => ActionIconName,
        (Action, "defaults") => DefaultsBlock,
        (Action, "annotate") => Annotate,
        (DefaultsBlock, "allow_any") => AllowAny,
        (DefaultsBlock, "allow_inactive") => AllowInactive,
        (DefaultsBlock, "allow_active") => AllowActive,
        _ => Unknown,
    }
}

#[allow(clippy::too_many_arguments)]
fn finish_element(
    state: &State,
    file: &Path,
    stack: &mut Vec<State>,
    text_buf: &mut String,
    current_lang: &mut Option<String>,
    current_annotate_key: &mut Option<String>,
    current_action: &mut Option<ActionBuilder>,
    actions: &mut Vec<ActionDecl>,
    global_vendor: &mut Option<String>,
    global_vendor_url: &mut Option<String>,
    global_icon_name: &mut Option<String>,
) -> Result<(), PolicyLoadError> {
    let text = text_buf.trim().to_string();

    match state {
        State::GlobalVendor => *global_vendor = Some(text),
        State::GlobalVendorUrl => *global_vendor_url = Some(text),
        State::GlobalIconName => {
            if !validate_icon_name(&text) {
                return Err(PolicyLoadError::InvalidIconName { file: file.to_path_buf(), action: "<policyconfig>".to_string(), icon: text });
            }
            *global_icon_name = Some(text);
        },
        State::Description => {
            let action = current_action.as_mut().expect("Description only reachable inside an Action frame");
            match current_lang.take() {
                Some(lang) => {
                    action.description.by_lang.insert(lang, text);
                },
                None => action.description.default = text,
            }
        },
        State::Message => {
            let action = current_action.as_mut().expect("Message only reachable inside an Action frame");
            match current_lang.take() {
                Some(lang) => {
                    action.message.by_lang.insert(lang, text);
                },
                None => action.message.default = text,
            }
        },
        State::ActionVendor => current_action.as_mut().expect("ActionVendor only reachable inside an Action frame").vendor = Some(text),
        State::ActionVendorUrl => current_action.as_mut().expect("ActionVendorUrl only reachable inside an Action frame").vendor_url = Some(text),
        State::ActionIconName => {
            let action = current_action.as_mut().expect("ActionIconName only reachable inside an Action frame");
            if !validate_icon_name(&text) {
                return Err(PolicyLoadError::InvalidIconName { file: file.to_path_buf(), action: action.id.clone(), icon: text });
            }
            action.icon_name = Some(text);
        },
        State::AllowAny | State::AllowInactive | State::AllowActive => {
            let action = current_action.as_mut().expect("allow_* only reachable inside a Defaults frame inside an Action frame");
            let decision = Decision::from_name(&text)
                .ok_or_else(|| PolicyLoadError::UnknownResultWord { file: file.to_path_buf(), action: action.id.clone(), word: text.clone() })?;
            match state {
                State::AllowAny => action.allow_any = Some(decision),
                State::AllowInactive => action.allow_inactive = Some(decision),
                State::AllowActive => action.allow_active = Some(decision),
                _ => unreachable!(),
            }
        },
        State::Annotate => {
            let action = current_action.as_mut().expect("Annotate only reachable inside an Action frame");
            if let Some(key) = current_annotate_key.take() {
                action.annotations.insert(key, text);
            }
        },
        State::Action => {
            let builder = current_action.take().expect("Action frame closing without a builder in progress");
            let id = ActionId::new(&builder.id).map_err(|_| PolicyLoadError::InvalidActionId { file: file.to_path_buf(), id: builder.id.clone() })?;
            let defaults = Defaults {
                allow_any: builder.allow_any.ok_or_else(|| PolicyLoadError::MissingDefaults { file: file.to_path_buf(), action: builder.id.clone() })?,
                allow_inactive: builder
                    .allow_inactive
                    .ok_or_else(|| PolicyLoadError::MissingDefaults { file: file.to_path_buf(), action: builder.id.clone() })?,
                allow_active: builder
                    .allow_active
                    .ok_or_else(|| PolicyLoadError::MissingDefaults { file: file.to_path_buf(), action: builder.id.clone() })?,
            };
            actions.push(ActionDecl {
                id,
                description: builder.description,
                message: builder.message,
                vendor: builder.vendor.or_else(|| global_vendor.clone()),
                vendor_url: builder.vendor_url.or_else(|| global_vendor_url.clone()),
                icon_name: builder.icon_name.or_else(|| global_icon_name.clone()),
                defaults,
                annotations: builder.annotations,
                source_file: file.to_path_buf(),
            });
        },
        _ => {},
    }

    stack.pop();
    text_buf.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        <?xml version="1.0" encoding="UTF-8"?>
        <policyconfig>
          <vendor>Example Vendor</vendor>
          <action id="org.example.valid3">
            <description>example</description>
            <description xml:lang="da">example (danish)</description>
            <message>do the thing</message>
            <defaults>
              <allow_any>no</allow_any>
              <allow_inactive>no</allow_inactive>
              <allow_active>auth_self_keep_always</allow_active>
            </defaults>
            <annotate key="org.example.detail">42</annotate>
          </action>
        </policyconfig>
    "#;

    #[test]
    fn parses_scenario_one_from_spec() {
        let (actions, diags) = parse_policy_file(Path::new("test.policy"), SAMPLE).unwrap();
        assert!(diags.is_empty());
        assert_eq!(actions.len(), 1);
        let action = &actions[0];
        assert_eq!(action.id.as_str(), "org.example.valid3");
        assert_eq!(action.description.resolve(Some("da_DK")), "example (danish)");
        assert_eq!(action.description.resolve(Some("en_CA")), "example");
        assert_eq!(action.defaults.allow_active, Decision::SelfAuth(pk_identity::ResultTier::KeepAlways));
        assert_eq!(action.vendor.as_deref(), Some("Example Vendor"));
        assert_eq!(action.annotations.get("org.example.detail"), Some(&"42".to_string()));
    }

    #[test]
    fn unknown_elements_are_diagnosed_not_fatal() {
        let xml = r#"<policyconfig><frobnicator/><action id="org.example.a"><defaults><allow_any>no</allow_any><allow_inactive>no</allow_inactive><allow_active>yes</allow_active></defaults></action></policyconfig>"#;
        let (actions, diags) = parse_policy_file(Path::new("t.policy"), xml).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn invalid_action_id_is_an_error() {
        let xml = r#"<policyconfig><action id="not-dotted"><defaults><allow_any>no</allow_any><allow_inactive>no</allow_inactive><allow_active>no</allow_active></defaults></action></policyconfig>"#;
        assert!(matches!(parse_policy_file(Path::new("t.policy"), xml), Err(PolicyLoadError::InvalidActionId { .. })));
    }

    #[test]
    fn unknown_result_word_is_an_error() {
        let xml = r#"<policyconfig><action id="org.example.a"><defaults><allow_any>maybe</allow_any><allow_inactive>no</allow_inactive><allow_active>no</allow_active></defaults></action></policyconfig>"#;
        assert!(matches!(parse_policy_file(Path::new("t.policy"), xml), Err(PolicyLoadError::UnknownResultWord { .. })));
    }

    #[test]
    fn invalid_icon_name_is_an_error() {
        let xml = r#"<policyconfig><action id="org.example.a"><icon_name>foo.png</icon_name><defaults><allow_any>no</allow_any><allow_inactive>no</allow_inactive><allow_active>no</allow_active></defaults></action></policyconfig>"#;
        assert!(matches!(parse_policy_file(Path::new("t.policy"), xml), Err(PolicyLoadError::InvalidIconName { .. })));
    }

    #[test]
    fn depth_overflow_is_an_error() {
        let mut xml = String::from("<policyconfig>");
        for _ in 0..40 {
            xml.push_str("<a>");
        }
        for _ in 0..40 {
            xml.push_str("</a>");
        }
        xml.push_str("</policyconfig>");
        assert!(matches!(parse_policy_file(Path::new("t.policy"), &xml), Err(PolicyLoadError::DepthOverflow { .. })));
    }
}
