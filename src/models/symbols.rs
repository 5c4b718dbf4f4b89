//! Symbol alphabets
//!
//! Each alphabet is a character table followed by 84 ARPAbet phonemes.
//! Only the vocabulary size matters to the acoustic model; the character
//! table lets the CLI turn plain text into ids without a phonemizer.

use std::fmt;
use std::str::FromStr;

use crate::core::error::{Result, TtsError};

/// Number of ARPAbet phonemes appended to every alphabet
pub const ARPABET_SYMBOLS: usize = 84;

const ENGLISH_BASIC: &str =
    "_-!'(),.:;? ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const ENGLISH_BASIC_LOWERCASE: &str = "_-!'\"(),.:;? abcdefghijklmnopqrstuvwxyz";
const ENGLISH_EXPANDED: &str = "!'\",.:;? #%&*+-/[]()_@©°½—₩€$áçéêëñöøćžABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Known symbol alphabets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SymbolAlphabet {
    #[default]
    EnglishBasic,
    EnglishBasicLowercase,
    EnglishExpanded,
}

impl SymbolAlphabet {
    pub fn name(&self) -> &'static str {
        match self {
            SymbolAlphabet::EnglishBasic => "english_basic",
            SymbolAlphabet::EnglishBasicLowercase => "english_basic_lowercase",
            SymbolAlphabet::EnglishExpanded => "english_expanded",
        }
    }

    fn characters(&self) -> &'static str {
        match self {
            SymbolAlphabet::EnglishBasic => ENGLISH_BASIC,
            SymbolAlphabet::EnglishBasicLowercase => ENGLISH_BASIC_LOWERCASE,
            SymbolAlphabet::EnglishExpanded => ENGLISH_EXPANDED,
        }
    }

    /// Rows in the symbol embedding table
    pub fn vocab_size(&self) -> usize {
        self.characters().chars().count() + ARPABET_SYMBOLS
    }

    /// Map text to symbol ids, dropping characters outside the alphabet
    pub fn encode(&self, text: &str) -> Vec<u32> {
        let table: Vec<char> = self.characters().chars().collect();
        let text = match self {
            SymbolAlphabet::EnglishBasicLowercase => text.to_lowercase(),
            _ => text.to_string(),
        };
        text.chars()
            .filter_map(|c| table.iter().position(|&s| s == c))
            .map(|id| id as u32)
            .collect()
    }
}

impl fmt::Display for SymbolAlphabet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SymbolAlphabet {
    type Err = TtsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "english_basic" => Ok(SymbolAlphabet::EnglishBasic),
            "english_basic_lowercase" => Ok(SymbolAlphabet::EnglishBasicLowercase),
            "english_expanded" => Ok(SymbolAlphabet::EnglishExpanded),
            other => Err(TtsError::Validation {
                message: format!("{} symbol set does not exist", other),
                field: Some("symbols_alphabet".to_string()),
            }),
        }
    }
}
