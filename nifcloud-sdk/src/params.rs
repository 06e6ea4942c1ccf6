//! Query API parameters

/// Ordered request parameters for the query APIs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    pairs: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, replacing an earlier value for the same key
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((key, value)),
        }
        self
    }

    /// Set a parameter when the value is present and non-empty
    pub fn set_opt<S: Into<String>>(&mut self, key: &str, value: Option<S>) -> &mut Self {
        if let Some(value) = value {
            let value = value.into();
            if !value.is_empty() {
                self.set(key, value);
            }
        }
        self
    }

    pub fn set_bool(&mut self, key: &str, value: bool) -> &mut Self {
        self.set(key, if value { "true" } else { "false" })
    }

    /// `Key.1`, `Key.2`, ...
    pub fn set_list<S: AsRef<str>>(&mut self, key: &str, items: &[S]) -> &mut Self {
        for (i, item) in items.iter().enumerate() {
            self.set(format!("{}.{}", key, i + 1), item.as_ref());
        }
        self
    }

    /// `Key.member.1`, `Key.member.2`, ...
    pub fn set_members<S: AsRef<str>>(&mut self, key: &str, items: &[S]) -> &mut Self {
        self.set_list(&format!("{}.member", key), items)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Form-encoded request body including `Action` and `Version`
    pub fn encode(&self, action: &str, version: &str) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        serializer.append_pair("Action", action);
        serializer.append_pair("Version", version);
        for (k, v) in self.iter() {
            serializer.append_pair(k, v);
        }
        serializer.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexed_lists() {
        let mut params = Params::new();
        params
            .set_list("SecurityGroup", &["fw1", "fw2"])
            .set_members("InstanceIds", &["web001"]);

        assert_eq!(params.get("SecurityGroup.1"), Some("fw1"));
        assert_eq!(params.get("SecurityGroup.2"), Some("fw2"));
        assert_eq!(params.get("InstanceIds.member.1"), Some("web001"));
    }

    #[test]
    fn optional_values_skip_empty() {
        let mut params = Params::new();
        params
            .set_opt("Description", Some(""))
            .set_opt("Placement.AvailabilityZone", Some("east-11"))
            .set_opt::<String>("KeyName", None);

        assert_eq!(params.iter().count(), 1);
        assert_eq!(params.get("Placement.AvailabilityZone"), Some("east-11"));
    }

    #[test]
    fn set_replaces_existing_key() {
        let mut params = Params::new();
        params.set("Size", "100").set("Size", "200");
        assert_eq!(params.get("Size"), Some("200"));
        assert_eq!(params.iter().count(), 1);
    }

    #[test]
    fn encode_includes_action_and_version() {
        let mut params = Params::new();
        params.set("Description", "web server").set_bool("DisableApiTermination", false);
        assert_eq!(
            params.encode("RunInstances", "3.0"),
            "Action=RunInstances&Version=3.0&Description=web+server&DisableApiTermination=false"
        );
    }
}
