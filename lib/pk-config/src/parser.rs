//! The configuration file parser: a streaming, stack-based state machine
//! bounded at [`PARSER_MAX_DEPTH`] elements, mirroring the upstream
//! `ParserData`/`state_stack` approach in `polkit-config.c` but on top of
//! `quick-xml`'s pull API instead of hand-rolled expat callbacks.

use pk_identity::Decision;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;

use crate::error::ConfigLoadError;
use crate::model::{AdminAuthKind, AdminAuthRule, ConfigNode, ConfigTree, MatchKind};

/// Bound on element nesting, per `polkit-config.c`'s `PARSER_MAX_DEPTH`.
pub const PARSER_MAX_DEPTH: usize = 32;

/// A frame under construction. Named after the state it corresponds to in
/// the original parser's `state` field, since that's what governs which
/// child elements are recognised at this depth.
enum Frame {
    /// The `<config>` root -- the only element valid at depth zero.
    Config(Vec<ConfigNode>),
    Match { kind: MatchKind, pattern: String, regex: Regex, children: Vec<ConfigNode> },
    /// Accepts no further recognised children, same as the original.
    Return(Decision),
    DefineAdminAuth(AdminAuthRule),
    /// An element the schema doesn't recognise at this position. Its own
    /// children are unknown too, but still count against the depth bound.
    Unknown,
}

fn accepts_children(frame: &Frame) -> bool { matches!(frame, Frame::Config(_) | Frame::Match { .. }) }

fn push_child(parent: &mut Frame, child: ConfigNode) {
    match parent {
        Frame::Config(children) => children.push(child),
        Frame::Match { children, .. } => children.push(child),
        Frame::Return(_) | Frame::DefineAdminAuth(_) | Frame::Unknown => {},
    }
}

fn finish(frame: Frame) -> Option<ConfigNode> {
    match frame {
        Frame::Config(children) => Some(ConfigNode::Top { children }),
        Frame::Match { kind, pattern, regex, children } => Some(ConfigNode::Match { kind, pattern, regex, children }),
        Frame::Return(result) => Some(ConfigNode::Return { result }),
        Frame::DefineAdminAuth(rule) => Some(ConfigNode::DefineAdminAuth { rule }),
        Frame::Unknown => None,
    }
}

/// Parses a configuration file's contents into a [`ConfigTree`]. A file
/// with no recognisable `<config>` root parses successfully into the
/// empty tree, matching the original's tolerance of a stray top-level tag.
pub fn parse_config(contents: &str) -> Result<ConfigTree, ConfigLoadError> {
    let mut reader = Reader::from_str(contents);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<ConfigNode> = None;

    loop {
        let event = reader.read_event().map_err(ConfigLoadError::MalformedXml)?;
        match event {
            Event::Eof => break,
            Event::Start(e) => {
                let frame = open_element(&e, &stack)?;
                stack.push(frame);
            },
            Event::Empty(e) => {
                let frame = open_element(&e, &stack)?;
                close_top(&mut stack, frame, &mut root);
            },
            Event::End(_) => {
                let frame = stack.pop().ok_or(ConfigLoadError::DepthOverflow)?;
                close_top(&mut stack, frame, &mut root);
            },
            _ => {},
        }
    }

    Ok(match root {
        Some(node) => ConfigTree::from_root(node),
        None => ConfigTree::empty(),
    })
}

/// Finalises `frame` (which has already been popped, or was never pushed
/// for `Event::Empty`) and either attaches it to the new stack top or, if
/// the stack is now empty, records it as the tree root.
fn close_top(stack: &mut Vec<Frame>, frame: Frame, root: &mut Option<ConfigNode>) {
    let Some(node) = finish(frame) else { return };
    match stack.last_mut() {
        Some(parent) => push_child(parent, node),
        None => *root = Some(node),
    }
}

fn open_element(e: &BytesStart<'_>, stack: &[Frame]) -> Result<Frame, ConfigLoadError> {
    if stack.len() >= PARSER_MAX_DEPTH {
        return Err(ConfigLoadError::DepthOverflow);
    }

    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
    let attrs: Vec<(String, String)> = e
        .attributes()
        .filter_map(|a| a.ok())
        .map(|a| (String::from_utf8_lossy(a.key.as_ref()).to_string(), String::from_utf8_lossy(&a.value).to_string()))
        .collect();

    let parent = stack.last();

    if parent.is_none() {
        if name == "config" { return Ok(Frame::Config(Vec::new())) }
        return Ok(Frame::Unknown);
    }

    if !accepts_children(parent.unwrap()) {
        return Ok(Frame::Unknown);
    }

    match name.as_str() {
        "match" => {
            if attrs.len() != 1 {
                return Err(ConfigLoadError::MatchWrongAttrCount(attrs.len()));
            }
            let (key, value) = &attrs[0];
            let kind = match key.as_str() {
                "action" => MatchKind::Action,
                "user" => MatchKind::User,
                other => return Err(ConfigLoadError::UnknownMatchRule(other.to_string())),
            };
            let regex = Regex::new(value).map_err(|source| ConfigLoadError::InvalidRegex { pattern: value.clone(), source })?;
            Ok(Frame::Match { kind, pattern: value.clone(), regex, children: Vec::new() })
        },
        "return" => {
            if attrs.len() != 1 {
                return Err(ConfigLoadError::MissingReturnResult);
            }
            let (key, value) = &attrs[0];
            if key != "result" {
                return Err(ConfigLoadError::MissingReturnResult);
            }
            let result = Decision::from_name(value).ok_or_else(|| ConfigLoadError::UnknownReturnResult(value.clone()))?;
            Ok(Frame::Return(result))
        },
        "define_admin_auth" => {
            if attrs.len() != 1 {
                return Err(ConfigLoadError::AdminAuthWrongAttrCount(attrs.len()));
            }
            let (key, value) = &attrs[0];
            let kind = match key.as_str() {
                "user" => AdminAuthKind::User,
                "group" => AdminAuthKind::Group,
                other => return Err(ConfigLoadError::UnknownMatchRule(other.to_string())),
            };
            Ok(Frame::DefineAdminAuth(AdminAuthRule::parse(kind, value)))
        },
        _ => Ok(Frame::Unknown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{determine_admin_auth, evaluate_action, evaluate_user};

    #[test]
    fn empty_configuration_yields_unknown() {
        let tree = ConfigTree::empty();
        assert_eq!(evaluate_action(&tree, "org.example.foo"), None);
    }

    #[test]
    fn first_match_wins_depth_first_left_to_right() {
        let xml = r#"
            <config>
              <match action="org\.example\..*">
                <match user="0">
                  <return result="yes"/>
                </match>
                <return result="no"/>
              </match>
            </config>
        "#;
        let tree = parse_config(xml).unwrap();
        assert_eq!(evaluate_user(&tree, "org.example.frob", "0", "root"), Some(Decision::Yes));
        // `<match user="0">` is an unanchored POSIX-ERE pattern (`spec.md`
        // §4.3, `regexec`'s `REG_NOSUB|REG_EXTENDED`), so a uid/name pair
        // that merely *contains* "0" (e.g. uid "1000") would also match --
        // pick ones that don't, to exercise the no-match branch.
        assert_eq!(evaluate_user(&tree, "org.example.frob", "1", "alice"), Some(Decision::No));
        assert_eq!(evaluate_user(&tree, "org.other.frob", "0", "root"), None);
    }

    #[test]
    fn define_admin_auth_is_last_writer_wins_in_traversal_order() {
        let xml = r#"
            <config>
              <define_admin_auth group="wheel"/>
              <match action="org\.example\..*">
                <define_admin_auth group="admin"/>
              </match>
            </config>
        "#;
        let tree = parse_config(xml).unwrap();
        let rule = determine_admin_auth(&tree, "org.example.frob", "0", "root").unwrap();
        assert_eq!(rule.name, "admin");
    }

    #[test]
    fn unix_prefixed_admin_auth_overrides_attribute_kind() {
        let xml = r#"<config><define_admin_auth user="unix-group:wheel"/></config>"#;
        let tree = parse_config(xml).unwrap();
        let rule = determine_admin_auth(&tree, "any.action", "0", "root").unwrap();
        assert_eq!(rule.kind, AdminAuthKind::Group);
        assert_eq!(rule.name, "wheel");
    }

    #[test]
    fn unrecognised_element_is_skipped_not_fatal() {
        let xml = r#"<config><frobnicate/><return result="yes"/></config>"#;
        let tree = parse_config(xml).unwrap();
        assert_eq!(evaluate_action(&tree, "anything"), Some(Decision::Yes));
    }

    #[test]
    fn unknown_match_attribute_is_an_error() {
        let xml = r#"<config><match host="foo"><return result="yes"/></match></config>"#;
        assert!(matches!(parse_config(xml), Err(ConfigLoadError::UnknownMatchRule(_))));
    }

    #[test]
    fn invalid_regex_is_an_error() {
        let xml = r#"<config><match action="("><return result="yes"/></match></config>"#;
        assert!(matches!(parse_config(xml), Err(ConfigLoadError::InvalidRegex { .. })));
    }

    #[test]
    fn unknown_return_result_is_an_error() {
        let xml = r#"<config><return result="maybe"/></config>"#;
        assert!(matches!(parse_config(xml), Err(ConfigLoadError::UnknownReturnResult(_))));
    }

    #[test]
    fn depth_overflow_is_an_error() {
        let mut xml = String::from("<config>");
        for _ in 0..40 {
            xml.push_str(r#"<match action=".*">"#);
        }
        for _ in 0..40 {
            xml.push_str("</match>");
        }
        xml.push_str("</config>");
        assert!(matches!(parse_config(&xml), Err(ConfigLoadError::DepthOverflow)));
    }
}
