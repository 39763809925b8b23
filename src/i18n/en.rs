//! English strings

pub(super) const TABLE: &[(&str, &str)] = &[
    // App general
    ("app.title", "DrainScope"),
    ("app.version", "Version"),
    // Label fallbacks
    ("label.system_apps", "System apps"),
    ("label.app", "App"),
    ("label.user", "User"),
    ("label.unknown", "Unknown"),
    // System drain types
    ("drain.ambient", "Ambient display"),
    ("drain.audio", "Audio"),
    ("drain.bluetooth", "Bluetooth"),
    ("drain.camera", "Camera"),
    ("drain.cell", "Mobile radio"),
    ("drain.flashlight", "Flashlight"),
    ("drain.idle", "Device idle"),
    ("drain.memory", "Memory"),
    ("drain.phone", "Phone calls"),
    ("drain.screen", "Screen"),
    ("drain.wifi", "Wi-Fi"),
    ("drain.unaccounted", "Unaccounted"),
    ("drain.overcounted", "Overcounted"),
    // Slot views
    ("view.day", "Day"),
    ("view.hour", "Hour window"),
    ("view.all", "Entire window"),
    // Ranked table
    ("table.name", "Name"),
    ("table.power", "Power (mAh)"),
    ("table.percent", "Share (%)"),
];
