//! Resource IDs of the framework attributes, so names can be mapped to IDs when adding attributes
//! and IDs back to names when printing.

use std::collections::HashMap;

use crate::value::ResourceResolver;

// Framework attribute IDs from android.R.attr, covering the attributes commonly found in manifests.
const ANDROID_ATTRIBUTES: &[(&str, u32)] = &[
    ("theme", 0x01010000),
    ("label", 0x01010001),
    ("icon", 0x01010002),
    ("name", 0x01010003),
    ("manageSpaceActivity", 0x01010004),
    ("allowClearUserData", 0x01010005),
    ("permission", 0x01010006),
    ("readPermission", 0x01010007),
    ("writePermission", 0x01010008),
    ("protectionLevel", 0x01010009),
    ("permissionGroup", 0x0101000a),
    ("sharedUserId", 0x0101000b),
    ("hasCode", 0x0101000c),
    ("persistent", 0x0101000d),
    ("enabled", 0x0101000e),
    ("debuggable", 0x0101000f),
    ("exported", 0x01010010),
    ("process", 0x01010011),
    ("taskAffinity", 0x01010012),
    ("multiprocess", 0x01010013),
    ("finishOnTaskLaunch", 0x01010014),
    ("clearTaskOnLaunch", 0x01010015),
    ("stateNotNeeded", 0x01010016),
    ("excludeFromRecents", 0x01010017),
    ("authorities", 0x01010018),
    ("syncable", 0x01010019),
    ("initOrder", 0x0101001a),
    ("grantUriPermissions", 0x0101001b),
    ("priority", 0x0101001c),
    ("launchMode", 0x0101001d),
    ("screenOrientation", 0x0101001e),
    ("configChanges", 0x0101001f),
    ("description", 0x01010020),
    ("targetPackage", 0x01010021),
    ("handleProfiling", 0x01010022),
    ("functionalTest", 0x01010023),
    ("value", 0x01010024),
    ("resource", 0x01010025),
    ("mimeType", 0x01010026),
    ("scheme", 0x01010027),
    ("host", 0x01010028),
    ("port", 0x01010029),
    ("path", 0x0101002a),
    ("pathPrefix", 0x0101002b),
    ("pathPattern", 0x0101002c),
    ("action", 0x0101002d),
    ("data", 0x0101002e),
    ("targetClass", 0x0101002f),
    ("minSdkVersion", 0x0101020c),
    ("versionCode", 0x0101021b),
    ("versionName", 0x0101021c),
    ("targetSdkVersion", 0x01010270),
    ("maxSdkVersion", 0x01010271),
    ("allowBackup", 0x01010280),
    ("glEsVersion", 0x01010281),
    ("required", 0x0101028e),
    ("installLocation", 0x010102b7),
    ("hardwareAccelerated", 0x010102d3),
    ("largeHeap", 0x0101035a),
    ("extractNativeLibs", 0x010104ea),
    ("usesCleartextTraffic", 0x010104ec),
    ("compileSdkVersion", 0x01010572),
    ("compileSdkVersionCodename", 0x01010573),
    ("requestLegacyExternalStorage", 0x01010603),
];

/// Stores a map of AXML attribute names to resource IDs
#[derive(Clone, Debug, Default)]
pub struct ResourceIds {
    ids: HashMap<String, u32>,
    names: HashMap<u32, String>,
}

impl ResourceIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the IDs of the framework attributes in the `android` namespace.
    pub fn android() -> Self {
        let mut ids = Self::new();
        for (name, id) in ANDROID_ATTRIBUTES {
            ids.insert(name, *id);
        }

        ids
    }

    pub fn insert(&mut self, name: &str, id: u32) {
        self.ids.insert(name.to_string(), id);
        self.names.insert(id, name.to_string());
    }

    // Gets the resource ID for a particular attribute name. Returns None if no ID exists.
    pub fn get_res_id_or_none(&self, name: &str) -> Option<u32> {
        self.ids.get(name).copied()
    }

    pub fn get_name_or_none(&self, id: u32) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }
}

impl ResourceResolver for ResourceIds {
    fn resource_name(&self, id: u32) -> Option<String> {
        self.get_name_or_none(id)
            .map(|name| format!("android:attr/{name}"))
    }
}
