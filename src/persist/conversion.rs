use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use crate::{
    config::{ConversionBackend, ConversionConfig},
    error::ConversionError,
    geofile::gdal_geofile::{
        read_features_from_geofile, remove_shapefile, replace_shapefile,
        write_features_with_fields, GdalDriverType,
    },
};

/// Invocation of an `ogr2ogr` compatible binary.
#[derive(Debug, Clone)]
pub struct ExternalTool {
    pub program: PathBuf,
    pub crs: String,
    pub encoding: String,
    pub timeout: Option<Duration>,
}

impl ExternalTool {
    /// Arguments converting `input` to a shapefile at `output`, declaring the same source and target CRS.
    pub fn arguments(&self, input: &Path, output: &Path) -> Vec<OsString> {
        vec![
            "-f".into(),
            GdalDriverType::Shapefile.name().into(),
            output.into(),
            input.into(),
            "-s_srs".into(),
            self.crs.clone().into(),
            "-t_srs".into(),
            self.crs.clone().into(),
            "-lco".into(),
            format!("ENCODING={}", self.encoding).into(),
            "-overwrite".into(),
        ]
    }

    async fn convert(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
        let program = self.program.display().to_string();
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(self.arguments(input, output))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        log::debug!("Running {:?}", command);

        let running = command.output();
        let result = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, running)
                .await
                .map_err(|_| ConversionError::TimedOut {
                    program: program.clone(),
                    timeout,
                })?,
            None => running.await,
        };
        let output = result.map_err(|err| ConversionError::ToolExecution {
            program: program.clone(),
            diagnostic: format!("could not run: {}", err),
        })?;

        if output.status.success() {
            return Ok(());
        }
        let mut diagnostic = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if diagnostic.is_empty() {
            diagnostic = String::from_utf8_lossy(&output.stdout).trim().to_string();
        }
        if diagnostic.is_empty() {
            diagnostic = format!("exited with {}", output.status);
        }
        log::error!("{} failed: {}", program, diagnostic);
        Err(ConversionError::ToolExecution {
            program,
            diagnostic,
        })
    }
}

/// Conversion through the GDAL library linked into this binary.
#[derive(Debug, Clone)]
pub struct InProcessConverter {
    pub crs: String,
    pub encoding: String,
}

impl InProcessConverter {
    async fn convert(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
        let converter = self.clone();
        let input = input.to_path_buf();
        let output = output.to_path_buf();
        tokio::task::spawn_blocking(move || converter.convert_blocking(&input, &output))
            .await
            .map_err(|err| ConversionError::InProcess(err.to_string()))?
            .map_err(|err| ConversionError::InProcess(format!("{:#}", err)))
    }

    /// Writes next to `output` first so an existing shapefile survives a failed write.
    fn convert_blocking(&self, input: &Path, output: &Path) -> anyhow::Result<()> {
        let layer = read_features_from_geofile(input, &[])?;
        let spatial_ref = gdal::spatial_ref::SpatialRef::from_definition(&self.crs)?;
        let staged = staging_path(output);
        remove_shapefile(&staged)?;
        let encoding_option = format!("ENCODING={}", self.encoding);
        let written = write_features_with_fields(
            &layer.features,
            &layer.fields,
            &staged,
            Some(&spatial_ref),
            GdalDriverType::Shapefile.name(),
            &[encoding_option.as_str()],
        );
        if let Err(err) = written {
            if let Err(cleanup) = remove_shapefile(&staged) {
                log::warn!("Could not remove {:?}: {:#}", staged, cleanup);
            }
            return Err(err);
        }
        replace_shapefile(&staged, output)
    }
}

/// `<directory>/<stem>.tmp.shp` for an output `<directory>/<stem>.shp`.
fn staging_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!("{}.tmp.shp", stem))
}

/// Boundary to the interchange-to-shapefile conversion. One shot: failures are reported, never retried.
#[derive(Debug, Clone)]
pub enum ConversionGateway {
    External(ExternalTool),
    InProcess(InProcessConverter),
}

impl From<&ConversionConfig> for ConversionGateway {
    fn from(config: &ConversionConfig) -> Self {
        match config.backend {
            ConversionBackend::Ogr2ogr => ConversionGateway::External(ExternalTool {
                program: config.program.clone(),
                crs: config.crs.clone(),
                encoding: config.encoding.clone(),
                timeout: config.timeout_secs.map(Duration::from_secs),
            }),
            ConversionBackend::Gdal => ConversionGateway::InProcess(InProcessConverter {
                crs: config.crs.clone(),
                encoding: config.encoding.clone(),
            }),
        }
    }
}

impl ConversionGateway {
    pub async fn convert(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
        log::info!("Converting {:?} to {:?}", input, output);
        match self {
            ConversionGateway::External(tool) => tool.convert(input, output).await,
            ConversionGateway::InProcess(converter) => converter.convert(input, output).await,
        }
    }
}
