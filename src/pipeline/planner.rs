//! Stage planning
//!
//! Turns a source asset and an output profile into the chain of external
//! commands that produces the output file.

use crate::config::toolchain::{render, TemplateVars, Toolchain};
use crate::error::{FlacpipeError, Result};
use crate::types::{EncoderFamily, OutputProfile, PipelineSpec, SourceAsset};
use std::path::Path;

/// Most channels that can be transcoded without downmixing
pub const MAX_CHANNELS: u8 = 2;

/// Plan the pipeline that transcodes `asset` into `dest`.
///
/// - no resampling: `decode | encode`
/// - resampling: `decode+resample+dither | encode`
/// - resampling into lossless: a single `decode+resample+dither` straight
///   into `dest`
///
/// A lossless batch where nothing needs resampling is passed through by the
/// coordinator without planning. Individual 16 bit files inside a batch that
/// does resample are re-encoded with `decode | flac`.
pub fn plan(
    asset: &SourceAsset,
    profile: OutputProfile,
    dest: &Path,
    toolchain: &Toolchain,
) -> Result<PipelineSpec> {
    if asset.channel_count > MAX_CHANNELS {
        return Err(FlacpipeError::UnsupportedChannelLayout {
            path: asset.path.clone(),
            channels: asset.channel_count,
        });
    }

    let resample = asset.resample_plan();
    let rate = match (resample.required, resample.target_rate) {
        (false, _) => None,
        (true, Some(rate)) => Some(rate),
        (true, None) => {
            return Err(FlacpipeError::UnsupportedRate {
                path: asset.path.clone(),
                sample_rate: asset.sample_rate,
            })
        }
    };

    let source = utf8(&asset.path)?;
    let dest = utf8(dest)?;
    let vars = TemplateVars {
        source,
        dest,
        rate,
        opts: profile.encoder_options(),
    };

    if profile.is_lossless() && rate.is_some() {
        return Ok(PipelineSpec::new(vec![render(&toolchain.lossless_resampler, &vars)?]));
    }

    let decoder = if rate.is_some() {
        &toolchain.resampling_decoder
    } else {
        &toolchain.decoder
    };
    let encoder = match profile.encoder() {
        EncoderFamily::Lame => &toolchain.lame_encoder,
        EncoderFamily::Flac => &toolchain.flac_encoder,
    };

    Ok(PipelineSpec::new(vec![render(decoder, &vars)?, render(encoder, &vars)?]))
}

fn utf8(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| {
        FlacpipeError::unreadable(path, "path is not valid UTF-8 and cannot be passed to external tools")
    })
}
