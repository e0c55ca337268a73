use std::collections::HashMap;
use std::io::Read;
use std::sync::LazyLock;
use regex::Regex;
use crate::error::{Error, Result};
use crate::shims::Shim;

/// Placeholder for source or version values that could not be determined.
pub const UNKNOWN: &str = "???";

pub const SHEBANG_MISSING: &str = "unexpected EOF while skipping shebang line";
pub const METADATA_MISSING: &str = "unexpected EOF while reading metadata";
pub const COMMAND_MISSING: &str = "unexpected EOF while reading command";
pub const READ_FAILED: &str = "error reading contents";

/// Matches the metadata comment on the second line of a shim script.
///
/// The version may contain spaces; an optional trailing `parameters:` clause
/// carries a comma separated list.
static METADATA_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#\s*source:\s*(\S+)\s*version:\s*(.+?)(?:\s+parameters:\s*(\S+))?\s*$")
        .expect("metadata pattern is valid")
});

/// Script dialects a shim can be rendered into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Bash,
}

impl Dialect {
    pub fn shebang(self) -> &'static str {
        match self {
            Dialect::Bash => "#!/usr/bin/env bash",
        }
    }
}

/// Renders `shim` into a bash script and substitutes `{{param}}` placeholders.
///
/// Placeholders without a value in `values` are kept as literal text.
///
/// # Errors
///
/// Returns [`Error::InvalidShim`] if a field would break the three line layout of
/// the script, e.g. a command spanning several lines.
///
/// # Example
///
/// ```
/// use std::collections::HashMap;
/// use conshim::{render_shim, Shim};
///
/// let shim = Shim {
///     name: "node".to_string(),
///     source: "user".to_string(),
///     version: "20".to_string(),
///     parameters: vec!["tag".to_string()],
///     command: "docker run --rm node:{{tag}} \"$@\"".to_string(),
///     ..Default::default()
/// };
/// let values = HashMap::from([("tag".to_string(), "20-alpine".to_string())]);
/// let script = render_shim(&shim, &values).unwrap();
/// assert!(script.ends_with("docker run --rm node:20-alpine \"$@\"\n"));
/// ```
pub fn render_shim(shim: &Shim, values: &HashMap<String, String>) -> Result<String> {
    render_script(Dialect::Bash, shim, values)
}

pub fn render_script(dialect: Dialect, shim: &Shim, values: &HashMap<String, String>) -> Result<String> {
    validate_for_render(shim)?;

    let source = or_unknown(&shim.source);
    let version = or_unknown(&shim.version);

    let mut metadata = format!("# source: {source} version: {version}");
    if !shim.parameters.is_empty() {
        metadata.push_str(&format!(" parameters: {}", shim.parameters.join(",")));
    }
    check_metadata_line(shim, &metadata, source, version)?;

    let mut script = String::new();
    script.push_str(dialect.shebang());
    script.push('\n');
    script.push_str(&metadata);
    script.push('\n');
    script.push_str(&shim.command);
    script.push('\n');

    Ok(substitute_parameters(&script, values))
}

fn or_unknown(value: &str) -> &str {
    if value.is_empty() { UNKNOWN } else { value }
}

fn validate_for_render(shim: &Shim) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidShim {
        name: shim.name.clone(),
        reason: reason.to_string(),
    };
    let has_line_break = |s: &str| s.contains(['\n', '\r']);

    if has_line_break(&shim.command) {
        return Err(invalid("command must be a single line"));
    }
    if has_line_break(&shim.version) {
        return Err(invalid("version must be a single line"));
    }
    if shim.source.contains(char::is_whitespace) {
        return Err(invalid("source must not contain whitespace"));
    }
    for parameter in &shim.parameters {
        if parameter.is_empty() || parameter.contains(|c: char| c == ',' || c.is_whitespace()) {
            return Err(invalid(&format!("invalid parameter name '{parameter}'")));
        }
    }
    Ok(())
}

/// Rejects metadata that [`parse_shim`] would read back differently, such as a
/// version with surrounding whitespace or its own `parameters:` clause.
fn check_metadata_line(shim: &Shim, line: &str, source: &str, version: &str) -> Result<()> {
    let parameters = shim.parameters.join(",");
    let reads_back = METADATA_LINE.captures(line).is_some_and(|captures| {
        &captures[1] == source
            && &captures[2] == version
            && captures.get(3).map_or("", |m| m.as_str()) == parameters
    });
    if reads_back {
        Ok(())
    } else {
        Err(Error::InvalidShim {
            name: shim.name.clone(),
            reason: format!("version '{version}' can't be stored in the metadata line"),
        })
    }
}

/// Replaces each `{{name}}` whose name has a value, scanning left to right in a single pass.
///
/// Substituted values are never rescanned, so a value containing `{{x}}` stays as is.
/// Braces that don't open a known placeholder are copied through, so `${{{var}}}`
/// becomes `${value}`.
pub fn substitute_parameters(text: &str, values: &HashMap<String, String>) -> String {
    if values.is_empty() {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        rest = &rest[start..];
        match placeholder_at(rest, values) {
            Some((len, value)) => {
                out.push_str(value);
                rest = &rest[len..];
            }
            None => {
                out.push('{');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Length and value of the longest `{{key}}` with a value at the start of `text`.
fn placeholder_at<'a>(text: &str, values: &'a HashMap<String, String>) -> Option<(usize, &'a str)> {
    let inner = text.strip_prefix("{{")?;
    values
        .iter()
        .filter(|(key, _)| {
            inner
                .strip_prefix(key.as_str())
                .is_some_and(|after| after.starts_with("}}"))
        })
        .max_by_key(|(key, _)| key.len())
        .map(|(key, value)| (key.len() + 4, value.as_str()))
}

/// Parses a shim script back into its metadata. Never fails.
///
/// A well-formed script has a shebang line, a metadata comment and the command.
/// Missing lines are reported through sentinel values in `command`, and unknown
/// source or version stay at [`UNKNOWN`].
pub fn parse_shim(name: &str, script: &[u8]) -> Shim {
    let mut shim = Shim {
        name: name.to_string(),
        source: UNKNOWN.to_string(),
        version: UNKNOWN.to_string(),
        ..Default::default()
    };

    let contents = String::from_utf8_lossy(script);
    let mut lines = contents.lines();

    if lines.next().is_none() {
        shim.command = SHEBANG_MISSING.to_string();
        return shim;
    }

    let Some(metadata) = lines.next() else {
        shim.command = METADATA_MISSING.to_string();
        return shim;
    };

    if let Some(captures) = METADATA_LINE.captures(metadata) {
        shim.source = captures[1].to_string();
        shim.version = captures[2].to_string();
        if let Some(parameters) = captures.get(3) {
            shim.parameters = parameters.as_str().split(',').map(str::to_string).collect();
        }
    }

    shim.command = match lines.next() {
        Some(command) => command.to_string(),
        None => COMMAND_MISSING.to_string(),
    };

    shim
}

/// Same as [`parse_shim`], reading the script from `reader` first.
pub fn parse_shim_from_reader<R: Read>(name: &str, mut reader: R) -> Shim {
    let mut contents = Vec::new();
    if let Err(e) = reader.read_to_end(&mut contents) {
        tracing::debug!("error reading contents of shim '{}': {}", name, e);
        return unreadable_shim(name);
    }
    parse_shim(name, &contents)
}

/// Placeholder entry for a shim whose script could not be read at all.
pub(crate) fn unreadable_shim(name: &str) -> Shim {
    Shim {
        name: name.to_string(),
        source: UNKNOWN.to_string(),
        version: UNKNOWN.to_string(),
        command: READ_FAILED.to_string(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container_shim() -> Shim {
        Shim {
            name: "node".to_string(),
            source: "some-source".to_string(),
            version: "1234567".to_string(),
            description: "Node.js in a container".to_string(),
            parameters: vec!["tag".to_string(), "workdir".to_string()],
            command: "docker run --rm -v {{workdir}}:/src node:{{tag}} \"$@\"".to_string(),
        }
    }

    #[test]
    fn test_parse_all_parts() {
        let script = "#!/usr/bin/env bash\n# source: some-source version: 1234567 parameters: a,b,c\ndocker run container \"$@\"";
        let shim = parse_shim("test", script.as_bytes());

        assert_eq!(shim.name, "test");
        assert_eq!(shim.source, "some-source");
        assert_eq!(shim.version, "1234567");
        assert_eq!(shim.parameters, vec!["a", "b", "c"]);
        assert_eq!(shim.command, "docker run container \"$@\"");
    }

    #[test]
    fn test_parse_without_parameters() {
        let script = "#!/usr/bin/env bash\n# source: some-source version: 1234567\ndocker run container \"$@\"";
        let shim = parse_shim("test", script.as_bytes());

        assert_eq!(shim.source, "some-source");
        assert_eq!(shim.version, "1234567");
        assert!(shim.parameters.is_empty());
        assert_eq!(shim.command, "docker run container \"$@\"");
    }

    #[test]
    fn test_parse_empty_file() {
        let shim = parse_shim("test", b"");

        assert_eq!(shim.source, UNKNOWN);
        assert_eq!(shim.version, UNKNOWN);
        assert_eq!(shim.command, SHEBANG_MISSING);
    }

    #[test]
    fn test_parse_metadata_missing() {
        let shim = parse_shim("test", b"#!/usr/bin/env bash");

        assert_eq!(shim.source, UNKNOWN);
        assert_eq!(shim.version, UNKNOWN);
        assert_eq!(shim.command, METADATA_MISSING);
    }

    #[test]
    fn test_parse_command_missing() {
        let shim = parse_shim("test", b"#!/usr/bin/env bash\n# source: some-source version: 1234567");

        assert_eq!(shim.source, "some-source");
        assert_eq!(shim.version, "1234567");
        assert_eq!(shim.command, COMMAND_MISSING);
    }

    #[test]
    fn test_parse_unmatched_metadata_still_reads_command() {
        let shim = parse_shim("test", b"#!/bin/sh\n# hand written\nexec docker run alpine");

        assert_eq!(shim.source, UNKNOWN);
        assert_eq!(shim.version, UNKNOWN);
        assert_eq!(shim.command, "exec docker run alpine");
    }

    #[test]
    fn test_parse_version_with_spaces() {
        let shim = parse_shim("test", b"#!/usr/bin/env bash\n# source: user version: 1.2 beta 3\nls");
        assert_eq!(shim.version, "1.2 beta 3");

        let shim = parse_shim(
            "test",
            b"#!/usr/bin/env bash\n#source:user   version: 1.2 beta parameters: x,y  \nls",
        );
        assert_eq!(shim.source, "user");
        assert_eq!(shim.version, "1.2 beta");
        assert_eq!(shim.parameters, vec!["x", "y"]);
    }

    #[test]
    fn test_parse_crlf_lines() {
        let shim = parse_shim("test", b"#!/usr/bin/env bash\r\n# source: s version: 1\r\necho hi\r\n");
        assert_eq!(shim.source, "s");
        assert_eq!(shim.version, "1");
        assert_eq!(shim.command, "echo hi");
    }

    #[test]
    fn test_parse_invalid_utf8_is_total() {
        let shim = parse_shim("test", &[0xff, 0xfe, b'\n', 0xff]);
        assert_eq!(shim.source, UNKNOWN);
        assert_eq!(shim.command, COMMAND_MISSING);
    }

    #[test]
    fn test_parse_from_failing_reader() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("disk on fire"))
            }
        }

        let shim = parse_shim_from_reader("test", Broken);
        assert_eq!(shim.source, UNKNOWN);
        assert_eq!(shim.command, READ_FAILED);
    }

    #[test]
    fn test_render_layout() {
        let script = render_shim(&container_shim(), &HashMap::new()).unwrap();
        let lines: Vec<_> = script.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "#!/usr/bin/env bash");
        assert_eq!(lines[1], "# source: some-source version: 1234567 parameters: tag,workdir");
        assert_eq!(lines[2], "docker run --rm -v {{workdir}}:/src node:{{tag}} \"$@\"");
        assert!(script.ends_with('\n'));
    }

    #[test]
    fn test_render_substitutes_known_parameters_only() {
        let values = HashMap::from([("tag".to_string(), "20-alpine".to_string())]);
        let script = render_shim(&container_shim(), &values).unwrap();

        assert!(script.contains("node:20-alpine"));
        assert!(script.contains("-v {{workdir}}:/src"));
    }

    #[test]
    fn test_render_without_parameters_omits_clause() {
        let shim = Shim {
            name: "jq".to_string(),
            source: "user".to_string(),
            version: "NONE".to_string(),
            command: "docker run -i stedolan/jq \"$@\"".to_string(),
            ..Default::default()
        };
        let script = render_shim(&shim, &HashMap::new()).unwrap();
        assert_eq!(
            script,
            "#!/usr/bin/env bash\n# source: user version: NONE\ndocker run -i stedolan/jq \"$@\"\n"
        );
    }

    #[test]
    fn test_render_empty_metadata_uses_unknown() {
        let shim = Shim { name: "x".to_string(), command: "true".to_string(), ..Default::default() };
        let script = render_shim(&shim, &HashMap::new()).unwrap();
        assert!(script.contains("# source: ??? version: ???\n"));
    }

    #[test]
    fn test_render_rejects_multiline_command() {
        let mut shim = container_shim();
        shim.command = "echo one\necho two".to_string();

        let err = render_shim(&shim, &HashMap::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidShim { ref name, .. } if name == "node"));
    }

    #[test]
    fn test_render_rejects_bad_fields() {
        let mut shim = container_shim();
        shim.source = "two words".to_string();
        assert!(render_shim(&shim, &HashMap::new()).is_err());

        let mut shim = container_shim();
        shim.parameters = vec!["a,b".to_string()];
        assert!(render_shim(&shim, &HashMap::new()).is_err());
    }

    #[test]
    fn test_render_then_parse_keeps_metadata() {
        let mut shim = container_shim();
        shim.version = "2.0 release candidate".to_string();

        let script = render_shim(&shim, &HashMap::new()).unwrap();
        let parsed = parse_shim("node", script.as_bytes());

        assert_eq!(parsed.source, shim.source);
        assert_eq!(parsed.version, "2.0 release candidate");
        assert_eq!(parsed.parameters, shim.parameters);
        assert_eq!(parsed.command, shim.command);
        assert!(parsed.description.is_empty());
    }

    #[test]
    fn test_render_rejects_versions_that_read_back_differently() {
        for version in ["1 parameters: a", "1.0 ", " 1.0"] {
            let mut shim = container_shim();
            shim.version = version.to_string();
            shim.parameters.clear();

            let err = render_shim(&shim, &HashMap::new()).unwrap_err();
            assert!(matches!(err, Error::InvalidShim { .. }), "{version:?}");
        }

        let mut shim = container_shim();
        shim.version = "1 parameters:".to_string();
        shim.parameters.clear();
        let script = render_shim(&shim, &HashMap::new()).unwrap();
        assert_eq!(parse_shim("node", script.as_bytes()).version, "1 parameters:");
    }

    #[test]
    fn test_substitute_after_stray_braces() {
        let values = HashMap::from([
            ("var".to_string(), "HOME".to_string()),
            ("tag".to_string(), "20".to_string()),
        ]);
        assert_eq!(substitute_parameters("echo ${{{var}}}", &values), "echo ${HOME}");
        assert_eq!(substitute_parameters("echo '{{' node:{{tag}}", &values), "echo '{{' node:20");
        assert_eq!(substitute_parameters("{{{{tag}}}}", &values), "{{20}}");
    }

    #[test]
    fn test_render_command_with_bash_braces() {
        let mut shim = container_shim();
        shim.parameters = vec!["var".to_string()];
        shim.command = "docker run -e X=${{{var}}} alpine".to_string();

        let values = HashMap::from([("var".to_string(), "HOME".to_string())]);
        let script = render_shim(&shim, &values).unwrap();
        assert!(script.ends_with("docker run -e X=${HOME} alpine\n"));
    }

    #[test]
    fn test_substitute_is_single_pass() {
        let values = HashMap::from([
            ("a".to_string(), "{{b}}".to_string()),
            ("b".to_string(), "B".to_string()),
        ]);
        assert_eq!(substitute_parameters("x {{a}} {{b}} {{c}} {{", &values), "x {{b}} B {{c}} {{");
    }
}
