use super::Options;
use crate::registry::Registry;
use crate::{Error, Result};

impl Options {
    /// Rejects option sets that cannot run, before anything is enumerated.
    pub fn validate(&self, registry: &Registry) -> Result<()> {
        if self.domains.is_empty() && !self.stdin {
            return Err(Error::NoInput);
        }

        if self.verbose && self.silent {
            return Err(Error::VerboseAndSilent);
        }

        if self.timeout == 0 {
            return Err(Error::ZeroTimeout);
        }

        if self.max_enumeration_time == 0 {
            return Err(Error::ZeroEnumerationTime);
        }

        if let Some(spec) = self
            .rate_limits
            .iter()
            .find(|spec| !registry.contains(&spec.source))
        {
            return Err(Error::UnknownRateLimitSource(spec.source.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::RateLimitSpec;
    use std::time::Duration;

    fn options() -> Options {
        Options {
            domains: vec!["contoso.com".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn default_options_with_a_domain_are_valid() {
        let registry = Registry::builtin().unwrap();
        assert!(options().validate(&registry).is_ok());
    }

    #[test]
    fn missing_input_is_rejected() {
        let registry = Registry::builtin().unwrap();
        let res = Options::default().validate(&registry);
        assert!(matches!(res, Err(Error::NoInput)));

        let from_stdin = Options {
            stdin: true,
            ..Default::default()
        };
        assert!(from_stdin.validate(&registry).is_ok());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let registry = Registry::builtin().unwrap();
        let res = Options {
            timeout: 0,
            ..options()
        }
        .validate(&registry);
        assert!(matches!(res, Err(Error::ZeroTimeout)));
    }

    #[test]
    fn verbose_and_silent_are_exclusive() {
        let registry = Registry::builtin().unwrap();
        let res = Options {
            verbose: true,
            silent: true,
            ..options()
        }
        .validate(&registry);
        assert!(matches!(res, Err(Error::VerboseAndSilent)));

        let verbose = Options {
            verbose: true,
            ..options()
        };
        assert!(verbose.validate(&registry).is_ok());
        assert_eq!(verbose.log_filter(), "debug");
    }

    #[test]
    fn zero_enumeration_time_is_rejected() {
        let registry = Registry::builtin().unwrap();
        let res = Options {
            max_enumeration_time: 0,
            ..options()
        }
        .validate(&registry);
        assert!(matches!(res, Err(Error::ZeroEnumerationTime)));
    }

    #[test]
    fn huge_enumeration_time_saturates() {
        let huge = Options {
            max_enumeration_time: u64::MAX,
            ..options()
        };
        assert_eq!(huge.max_enumeration_time(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn rate_limit_for_unknown_source_is_rejected() {
        let registry = Registry::builtin().unwrap();
        let mut options = options();
        options
            .rate_limits
            .push(RateLimitSpec::new("nope", 1, Duration::from_secs(1)));

        let res = options.validate(&registry);
        assert!(matches!(res, Err(Error::UnknownRateLimitSource(name)) if name == "nope"));
    }
}
