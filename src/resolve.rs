//! Channel label resolution.
//!
//! The persisted `Channel/Configuration Name` field is unreliable free
//! text; over the format's history it was written as `"<ordinal> :
//! <name>"`, as `"<name> <ordinal>"`, and as a bare name, by builds with
//! differing channel tables.  Resolution walks a fixed strategy ladder
//! and, when everything misses, synthesizes a fresh channel under the
//! label's bare configuration name so that the file still materializes
//! instead of being rejected.

use tracing::{debug, info};

use crate::model::ChannelConfigType;

/// One entry of the caller's channel table.
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub number: usize,
    pub name: String,
    pub channel_type: ChannelConfigType,
}

/// Result of resolving one label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub channel_number: usize,
    /// True when no table entry matched and a channel was created.
    pub synthetic: bool,
}

/// The channel table for the duration of one read or write call.
/// Append-only; numbers are 1-based and stable once assigned.
#[derive(Debug, Default)]
pub struct ResolutionContext {
    channels: Vec<ChannelInfo>,
}

impl ResolutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channels(channels: Vec<ChannelInfo>) -> Self {
        Self { channels }
    }

    pub fn channels(&self) -> &[ChannelInfo] {
        &self.channels
    }

    pub fn get(&self, number: usize) -> Option<&ChannelInfo> {
        self.channels.iter().find(|c| c.number == number)
    }

    fn by_name(&self, name: &str) -> Option<usize> {
        self.channels.iter().find(|c| c.name == name).map(|c| c.number)
    }

    fn by_number(&self, number: usize) -> Option<usize> {
        self.channels.iter().find(|c| c.number == number).map(|c| c.number)
    }

    /// Resolve a persisted label to a channel number, creating a
    /// synthetic channel as the final fallback.
    pub fn resolve(&mut self, label: &str, channel_type: ChannelConfigType) -> Resolution {
        let label = label.trim();

        if let Some(number) = self.try_strategies(label) {
            debug!(label, number, "channel label resolved");
            return Resolution { channel_number: number, synthetic: false };
        }

        let number = self.channels.iter().map(|c| c.number).max().unwrap_or(0) + 1;
        self.channels.push(ChannelInfo {
            number,
            name: bare_config_name(label).to_string(),
            channel_type,
        });
        info!(label, number, "no configured channel matches, created synthetic channel");
        Resolution { channel_number: number, synthetic: true }
    }

    fn try_strategies(&self, label: &str) -> Option<usize> {
        // 1: the label is exactly a configured channel name.
        if let Some(number) = self.by_name(label) {
            return Some(number);
        }

        // 2: trailing digits as a 1-based ordinal ("Motor 2").
        let digits: String =
            label.chars().rev().take_while(char::is_ascii_digit).collect::<String>();
        if !digits.is_empty() {
            let ordinal: String = digits.chars().rev().collect();
            if let Some(number) = ordinal.parse().ok().and_then(|n| self.by_number(n)) {
                return Some(number);
            }
        }

        // 3: first blank-separated token as an ordinal ("2 : Motor").
        if let Some(number) = label
            .split_whitespace()
            .next()
            .and_then(|token| token.parse().ok())
            .and_then(|n| self.by_number(n))
        {
            return Some(number);
        }

        // 4: strip a "N : " prefix and a trailing " token", then match
        // what is left as a bare configuration name.
        let bare = bare_config_name(label);
        if let Some(number) = self.by_name(bare) {
            return Some(number);
        }
        if let Some((rest, _token)) = bare.rsplit_once(' ') {
            if let Some(number) = self.by_name(rest.trim()) {
                return Some(number);
            }
        }

        None
    }
}

/// Strip a leading `"N : "` ordinal prefix from a persisted label,
/// leaving the bare configuration name.
pub fn bare_config_name(label: &str) -> &str {
    match label.split_once(" : ") {
        Some((prefix, rest)) if prefix.trim().parse::<usize>().is_ok() => rest.trim(),
        _ => label.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motor_table() -> ResolutionContext {
        ResolutionContext::with_channels(vec![
            ChannelInfo {
                number: 1,
                name: "Receiver".to_string(),
                channel_type: ChannelConfigType::Config,
            },
            ChannelInfo {
                number: 2,
                name: "Motor".to_string(),
                channel_type: ChannelConfigType::Config,
            },
        ])
    }

    #[test]
    fn every_historical_label_shape_resolves() {
        for label in ["2 : Motor", "Motor 2", "Motor"] {
            let mut ctx = motor_table();
            let res = ctx.resolve(label, ChannelConfigType::Config);
            assert_eq!(res.channel_number, 2, "label {label:?}");
            assert!(!res.synthetic, "label {label:?}");
            assert_eq!(ctx.channels().len(), 2);
        }
    }

    #[test]
    fn unmatched_label_creates_synthetic_channel() {
        let mut ctx = motor_table();
        let res = ctx.resolve("Zzz", ChannelConfigType::Config);
        assert!(res.synthetic);
        assert_eq!(res.channel_number, 3);
        assert_eq!(ctx.get(3).unwrap().name, "Zzz");

        // repeated resolution now hits the registered channel
        let again = ctx.resolve("Zzz", ChannelConfigType::Config);
        assert!(!again.synthetic);
        assert_eq!(again.channel_number, 3);
    }

    #[test]
    fn prefixed_label_with_trailing_token_matches_bare_name() {
        let mut ctx = ResolutionContext::with_channels(vec![ChannelInfo {
            number: 1,
            name: "Ausgang".to_string(),
            channel_type: ChannelConfigType::Outlet,
        }]);
        let res = ctx.resolve("7 : Ausgang links", ChannelConfigType::Outlet);
        assert!(!res.synthetic);
        assert_eq!(res.channel_number, 1);
    }

    #[test]
    fn empty_table_always_synthesizes() {
        let mut ctx = ResolutionContext::new();
        let res = ctx.resolve("1 : Ausgang", ChannelConfigType::Outlet);
        assert!(res.synthetic);
        assert_eq!(res.channel_number, 1);
        // registered under the bare name, not the prefixed label
        assert_eq!(ctx.get(1).unwrap().name, "Ausgang");

        let again = ctx.resolve("1 : Ausgang", ChannelConfigType::Outlet);
        assert!(!again.synthetic);
        assert_eq!(again.channel_number, 1);
    }
}
