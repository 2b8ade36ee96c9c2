#[derive(Clone, Debug)]
pub struct TemplateSettings {
    pub dir: String,
    /// Emit the template engine's internal debug logs.
    pub debug: bool,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub debug: bool,
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub template: TemplateSettings,
}

impl Default for Settings {
    /// Binds every interface on port 5000 with debug mode on, storing rows in
    /// `data.sqlite` next to the working directory.
    fn default() -> Self {
        Settings {
            debug: true,
            host: "0.0.0.0".to_string(),
            port: 5000,
            database_url: "sqlite://data.sqlite".to_string(),
            template: TemplateSettings {
                dir: "templates".to_string(),
                debug: false,
            },
        }
    }
}

impl Settings {
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
