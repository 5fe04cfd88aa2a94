//! Opening paths (or stdio for `-`) as byte streams.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};

use format_shared::{SpatialFormatError, SpatialFormatResult};
use geoproc_core_common::{OpenMode, STDIO_PATH};

pub(crate) fn open_input(path: &str) -> SpatialFormatResult<Box<dyn BufRead>> {
    if path == STDIO_PATH {
        log::debug!("Reading features from stdin");
        return Ok(Box::new(BufReader::new(std::io::stdin())));
    }

    let file = File::open(path).map_err(|e| SpatialFormatError::io(e, path))?;
    Ok(Box::new(BufReader::new(file)))
}

pub(crate) fn open_output(
    path: &str,
    mode: OpenMode,
    format: &str,
) -> SpatialFormatResult<BufWriter<Box<dyn Write>>> {
    let output: Box<dyn Write> = if path == STDIO_PATH {
        log::debug!("Writing features to stdout");
        Box::new(std::io::stdout())
    } else {
        match mode {
            OpenMode::Write => {
                Box::new(File::create(path).map_err(|e| SpatialFormatError::io(e, path))?)
            },
            OpenMode::Append => Box::new(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| SpatialFormatError::io(e, path))?,
            ),
            OpenMode::Read => {
                return Err(SpatialFormatError::Unsupported {
                    format: format.to_string(),
                    operation: "opening an output in read mode".to_string(),
                });
            },
        }
    };
    Ok(BufWriter::new(output))
}
