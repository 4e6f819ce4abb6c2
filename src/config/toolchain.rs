//! External program templates
//!
//! Each stage is described by a shell-style template. Templates are split into
//! words once, then placeholders are substituted per word, so paths containing
//! spaces or quotes never need re-splitting.
//!
//! Placeholders: `{SOURCE}`, `{DEST}`, `{RATE}` and `{OPTS}` (the profile's
//! encoder options, expanded into separate arguments).

use crate::error::{FlacpipeError, Result};
use crate::types::StageCommand;

/// Values substituted into a template
#[derive(Debug, Clone, Default)]
pub struct TemplateVars<'a> {
    pub source: &'a str,
    pub dest: &'a str,
    pub rate: Option<u32>,
    pub opts: &'a str,
}

/// Command templates for every stage role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    /// Lossless decoder writing PCM to stdout
    pub decoder: String,
    /// Decoder + resampler + dither writing 16 bit PCM to stdout
    pub resampling_decoder: String,
    /// Lossy encoder reading PCM from stdin
    pub lame_encoder: String,
    /// Lossless encoder reading PCM from stdin
    pub flac_encoder: String,
    /// Single-step lossless resample straight into the output file
    pub lossless_resampler: String,
}

impl Toolchain {
    /// Build the standard templates around the given program paths
    pub fn new(flac: &str, lame: &str, sox: &str) -> Self {
        let flac = shell_words::quote(flac);
        let lame = shell_words::quote(lame);
        let sox = shell_words::quote(sox);

        Self {
            decoder: format!("{flac} -dcs -- {{SOURCE}}"),
            resampling_decoder: format!("{sox} {{SOURCE}} -G -b 16 -t wav - rate -v -L {{RATE}} dither"),
            lame_encoder: format!("{lame} -S {{OPTS}} - {{DEST}}"),
            flac_encoder: format!("{flac} {{OPTS}} -o {{DEST}} -"),
            lossless_resampler: format!("{sox} {{SOURCE}} -G -b 16 {{DEST}} rate -v -L {{RATE}} dither"),
        }
    }

    /// Check every template parses and names a program
    pub fn validate(&self) -> Result<()> {
        for template in [
            &self.decoder,
            &self.resampling_decoder,
            &self.lame_encoder,
            &self.flac_encoder,
            &self.lossless_resampler,
        ] {
            split_template(template)?;
        }
        Ok(())
    }
}

impl Default for Toolchain {
    fn default() -> Self {
        Self::new("flac", "lame", "sox")
    }
}

fn split_template(template: &str) -> Result<Vec<String>> {
    let words = shell_words::split(template).map_err(|e| {
        FlacpipeError::ConfigError(format!("Malformed command template `{}`: {}", template, e))
    })?;
    if words.is_empty() {
        return Err(FlacpipeError::ConfigError("Empty command template".to_string()));
    }
    Ok(words)
}

/// Expand a template into a concrete stage command
pub fn render(template: &str, vars: &TemplateVars<'_>) -> Result<StageCommand> {
    let rate = vars.rate.map(|r| r.to_string()).unwrap_or_default();
    let mut words = Vec::new();

    for word in split_template(template)? {
        if word == "{OPTS}" {
            let opts = shell_words::split(vars.opts).map_err(|e| {
                FlacpipeError::ConfigError(format!("Malformed encoder options `{}`: {}", vars.opts, e))
            })?;
            words.extend(opts);
            continue;
        }
        words.push(
            word.replace("{SOURCE}", vars.source)
                .replace("{DEST}", vars.dest)
                .replace("{RATE}", &rate),
        );
    }

    let mut words = words.into_iter();
    // split_template guarantees at least one word
    let program = words.next().unwrap_or_default();
    Ok(StageCommand::new(program, words))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_keeps_paths_as_single_arguments() {
        let vars = TemplateVars {
            source: "/music/My Album/01 - \"Intro\".flac",
            ..Default::default()
        };
        let cmd = render(&Toolchain::default().decoder, &vars).unwrap();
        assert_eq!(cmd.program, "flac");
        assert_eq!(
            cmd.arguments,
            vec!["-dcs", "--", "/music/My Album/01 - \"Intro\".flac"]
        );
    }

    #[test]
    fn test_render_expands_options() {
        let vars = TemplateVars {
            dest: "/out/a.mp3",
            opts: "-V 0 --vbr-new",
            ..Default::default()
        };
        let cmd = render(&Toolchain::default().lame_encoder, &vars).unwrap();
        assert_eq!(cmd.arguments, vec!["-S", "-V", "0", "--vbr-new", "-", "/out/a.mp3"]);
    }

    #[test]
    fn test_render_substitutes_rate() {
        let vars = TemplateVars {
            source: "a.flac",
            rate: Some(48_000),
            ..Default::default()
        };
        let cmd = render(&Toolchain::default().resampling_decoder, &vars).unwrap();
        assert_eq!(cmd.program, "sox");
        assert!(cmd.arguments.contains(&"48000".to_string()));
    }

    #[test]
    fn test_program_paths_with_spaces() {
        let toolchain = Toolchain::new("/opt/my tools/flac", "lame", "sox");
        let cmd = render(&toolchain.decoder, &TemplateVars::default()).unwrap();
        assert_eq!(cmd.program, "/opt/my tools/flac");
    }

    #[test]
    fn test_validate_rejects_bad_templates() {
        let mut toolchain = Toolchain::default();
        assert!(toolchain.validate().is_ok());
        toolchain.decoder = "flac 'unterminated".to_string();
        assert!(toolchain.validate().is_err());
        toolchain.decoder = "   ".to_string();
        assert!(toolchain.validate().is_err());
    }
}
