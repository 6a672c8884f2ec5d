use crate::appliance::Device;
use serde::Serialize;
use std::fmt;

/// One line of the report, projected from a [`Device`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRecord {
    pub id: String,
    pub default_name: String,
    pub ipv4: String,
    pub display_name: String,
    pub mac_address: String,
}

impl From<&Device> for ReportRecord {
    /// The display name is only carried when the device has a default name.
    /// Reports have always been produced this way, so a device with an empty
    /// default name shows an empty display name even when the appliance has one.
    fn from(device: &Device) -> Self {
        let display_name = if device.default_name.is_empty() {
            String::new()
        } else {
            device.display_name.clone()
        };

        Self {
            id: device.id.clone(),
            default_name: device.default_name.clone(),
            ipv4: device.ipv4.clone().unwrap_or_default(),
            display_name,
            mac_address: device.mac_address.clone().unwrap_or_default(),
        }
    }
}

impl ReportRecord {
    pub fn fields(&self) -> [&str; 5] {
        [
            self.id.as_str(),
            self.default_name.as_str(),
            self.ipv4.as_str(),
            self.display_name.as_str(),
            self.mac_address.as_str(),
        ]
    }
}

impl fmt::Display for ReportRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields().iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write_field(f, field)?;
        }
        Ok(())
    }
}

/// Empty fields stay bare; only values that would break the line are quoted.
fn write_field(f: &mut fmt::Formatter<'_>, field: &str) -> fmt::Result {
    if field.contains([',', '"', '\n', '\r']) {
        write!(f, "\"{}\"", field.replace('"', "\"\""))
    } else {
        f.write_str(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(default_name: &str, display_name: &str) -> Device {
        Device {
            id: "1".to_string(),
            default_name: default_name.to_string(),
            ipv4: Some("10.0.0.5".to_string()),
            display_name: display_name.to_string(),
            mac_address: Some(String::new()),
        }
    }

    #[test]
    fn test_projection_and_line() {
        let record = ReportRecord::from(&device("bad-name", "Bad Box"));
        assert_eq!(record.to_string(), "1,bad-name,10.0.0.5,Bad Box,");
    }

    #[test]
    fn test_display_name_gated_on_default_name_quirk() {
        // Preserved behaviour: empty default name hides the display name.
        let record = ReportRecord::from(&device("", "Named Elsewhere"));
        assert_eq!(record.display_name, "");
        assert_eq!(record.to_string(), "1,,10.0.0.5,,");
    }

    #[test]
    fn test_missing_optional_fields_are_empty() {
        let d = Device {
            id: "42".to_string(),
            default_name: "host".to_string(),
            ipv4: None,
            display_name: "Host".to_string(),
            mac_address: Some("00:50:56:aa:bb:cc".to_string()),
        };
        assert_eq!(ReportRecord::from(&d).to_string(), "42,host,,Host,00:50:56:aa:bb:cc");
    }

    #[test]
    fn test_field_with_comma_is_quoted() {
        let record = ReportRecord::from(&device("lab, rack 3", "say \"hi\""));
        assert_eq!(
            record.to_string(),
            "1,\"lab, rack 3\",10.0.0.5,\"say \"\"hi\"\"\","
        );
    }
}
