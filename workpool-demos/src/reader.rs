// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Turns a file with a stream of JSON values into records.
//!
//! Every top-level JSON value is one token. Values may be concatenated or
//! newline-delimited. A records builder decides which records a token produces.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::de::IoRead;
use serde_json::{StreamDeserializer, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub type_name: String,
    pub data: Value,
}

impl Record {
    pub fn new(type_name: impl Into<String>, data: Value) -> Self {
        Self {
            type_name: type_name.into(),
            data,
        }
    }
}

/// Outcome of processing one token.
#[derive(Debug, PartialEq)]
pub enum Token {
    Records(Vec<Record>),
    EndOfStream,
}

pub struct RecordReader<R: io::Read> {
    stream: StreamDeserializer<'static, IoRead<R>, Value>,
    tokens_read: usize,
}

impl RecordReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        Ok(Self::from_reader(BufReader::new(file)))
    }
}

impl<R: io::Read> RecordReader<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            stream: serde_json::Deserializer::from_reader(reader).into_iter::<Value>(),
            tokens_read: 0,
        }
    }

    /// Decode the next token and let `builder` turn it into records.
    pub fn build_records_from_token<F>(&mut self, builder: F) -> anyhow::Result<Token>
    where
        F: FnOnce(Value) -> anyhow::Result<Vec<Record>>,
    {
        match self.next_value()? {
            Some(value) => Ok(Token::Records(builder(value)?)),
            None => Ok(Token::EndOfStream),
        }
    }

    pub fn tokens_read(&self) -> usize {
        self.tokens_read
    }

    fn next_value(&mut self) -> anyhow::Result<Option<Value>> {
        match self.stream.next() {
            Some(Ok(value)) => {
                self.tokens_read += 1;
                Ok(Some(value))
            }
            Some(Err(e)) => Err(anyhow::Error::new(e)
                .context(format!("failed to decode token {}", self.tokens_read + 1))),
            None => Ok(None),
        }
    }
}

/// Decodes a token that was just read into `T`. Meant to be called from a
/// records builder.
pub fn decode_token<T: DeserializeOwned>(value: Value) -> anyhow::Result<T> {
    serde_json::from_value(value).context("token has an unexpected shape")
}

/// Default records builder: objects with a string `type` field become a record
/// of that type, arrays produce one record per element, anything else is a
/// record of type `value`.
pub fn records_from_value(value: Value) -> anyhow::Result<Vec<Record>> {
    match value {
        Value::Array(items) => Ok(items.into_iter().map(record_from_value).collect()),
        other => Ok(vec![record_from_value(other)]),
    }
}

fn record_from_value(value: Value) -> Record {
    let type_name = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("value")
        .to_string();
    Record::new(type_name, value)
}
