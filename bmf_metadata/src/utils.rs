//! Misc file utilities
use std::fs;
use std::io;
use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;

use log::info;
use serde::{Deserialize, Serialize};

use crate::{Error, SerializedType};

fn extension_from_path<P: AsRef<Path>>(path: &P) -> Result<&str, Error> {
    path.as_ref()
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Invalid file type",
            ))
        })
}

fn serialized_type_from_path<P: AsRef<Path>>(
    path: &P,
) -> Result<SerializedType, Error> {
    let ext = extension_from_path(path)?;
    SerializedType::from_str(ext)
}

/// Save `obj` in the format named by the extension of `path`
pub fn serialize_obj<T, P>(obj: &T, path: P) -> Result<(), Error>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let serialized_type = serialized_type_from_path(&path)?;

    save(obj, path, serialized_type)
}

/// Load an object in the format named by the extension of `path`
pub fn deserialize_file<T, P>(path: P) -> Result<T, Error>
where
    for<'de> T: Deserialize<'de>,
    P: AsRef<Path>,
{
    let serialized_type = serialized_type_from_path(&path)?;

    load(path, serialized_type)
}

pub fn save<T, P>(
    obj: &T,
    path: P,
    serialized_type: SerializedType,
) -> Result<(), Error>
where
    T: Serialize,
    P: AsRef<Path>,
{
    match serialized_type {
        SerializedType::Yaml => serde_yaml::to_string(&obj)
            .map_err(Error::Yaml)
            .map(|s| s.into_bytes()),
        SerializedType::Json => {
            serde_json::to_vec_pretty(&obj).map_err(Error::Json)
        }
        SerializedType::Bincode => {
            bincode::serialize(&obj).map_err(Error::Bincode)
        }
    }
    .and_then(|bytes| {
        let file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut writer = io::BufWriter::new(file);
        writer.write_all(&bytes)?;
        writer.flush().map_err(Error::Io)
    })
}

pub fn load<T, P>(path: P, serialized_type: SerializedType) -> Result<T, Error>
where
    for<'de> T: Deserialize<'de>,
    P: AsRef<Path>,
{
    let mut file = io::BufReader::new(fs::File::open(path)?);

    match serialized_type {
        SerializedType::Yaml => {
            let mut ser = String::new();
            file.read_to_string(&mut ser)?;
            serde_yaml::from_str(ser.as_str()).map_err(Error::Yaml)
        }
        SerializedType::Json => {
            serde_json::from_reader(file).map_err(Error::Json)
        }
        SerializedType::Bincode => {
            bincode::deserialize_from(file).map_err(Error::Bincode)
        }
    }
}

/// Make sure `path` is a directory, creating it if needed
pub fn path_validator<P: AsRef<Path>>(path: P) -> Result<(), Error> {
    let path = path.as_ref();
    if !path.exists() {
        info!("{} does not exist. Creating...", path.display());
        fs::create_dir_all(path).map_err(Error::Io)
    } else if !path.is_dir() {
        let kind = io::ErrorKind::InvalidInput;
        Err(io::Error::new(kind, "path is not a directory").into())
    } else {
        Ok(())
    }
}

/// Delete `path`, treating an already missing file as success
pub(crate) fn remove_file<P: AsRef<Path>>(path: P) -> Result<(), Error> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err.into()),
        _ => Ok(()),
    }
}
