//! French strings / Cha\u{00EE}nes fran\u{00E7}aises

pub(super) const TABLE: &[(&str, &str)] = &[
    // App general
    ("app.title", "DrainScope"),
    ("app.version", "Version"),
    // Label fallbacks
    ("label.system_apps", "Applications syst\u{00E8}me"),
    ("label.app", "Application"),
    ("label.user", "Utilisateur"),
    ("label.unknown", "Inconnu"),
    // System drain types
    ("drain.ambient", "Affichage ambiant"),
    ("drain.audio", "Audio"),
    ("drain.bluetooth", "Bluetooth"),
    ("drain.camera", "Cam\u{00E9}ra"),
    ("drain.cell", "Radio mobile"),
    ("drain.flashlight", "Lampe torche"),
    ("drain.idle", "Veille de l'appareil"),
    ("drain.memory", "M\u{00E9}moire"),
    ("drain.phone", "Appels t\u{00E9}l\u{00E9}phoniques"),
    ("drain.screen", "\u{00C9}cran"),
    ("drain.wifi", "Wi-Fi"),
    ("drain.unaccounted", "Non comptabilis\u{00E9}"),
    ("drain.overcounted", "Surcomptabilis\u{00E9}"),
    // Slot views
    ("view.day", "Jour"),
    ("view.hour", "Fen\u{00EA}tre horaire"),
    ("view.all", "Fen\u{00EA}tre enti\u{00E8}re"),
    // Ranked table
    ("table.name", "Nom"),
    ("table.power", "\u{00C9}nergie (mAh)"),
    ("table.percent", "Part (%)"),
];
