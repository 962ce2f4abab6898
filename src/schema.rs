use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Student,
    Attendance,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Student => "student",
            EntityKind::Attendance => "attendance",
        }
    }

    pub fn schema(self) -> &'static EntitySchema {
        match self {
            EntityKind::Student => &STUDENT_SCHEMA,
            EntityKind::Attendance => &ATTENDANCE_SCHEMA,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Percent,
    Date,
}

#[derive(Debug)]
pub struct FieldSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    /// Accepted header spellings, tried in order.
    pub synonyms: &'static [&'static str],
    /// False for preview-only fields that have no column.
    pub stored: bool,
}

#[derive(Debug)]
pub struct EntitySchema {
    pub kind: EntityKind,
    pub table: &'static str,
    pub fields: &'static [FieldSpec],
    /// Natural key, in column order.
    pub key: &'static [&'static str],
    /// Columns that must be resolved before any row is read.
    pub required_columns: &'static [&'static str],
    /// Fields every accepted row must carry after coercion and derivation.
    pub required_fields: &'static [&'static str],
}

impl EntitySchema {
    pub fn field(&self, key: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn label(&self, key: &str) -> &'static str {
        self.field(key).map(|f| f.label).unwrap_or("")
    }

    pub fn stored_fields(&self) -> impl Iterator<Item = &'static FieldSpec> {
        self.fields.iter().filter(|f| f.stored)
    }
}

const fn text(
    key: &'static str,
    label: &'static str,
    synonyms: &'static [&'static str],
) -> FieldSpec {
    FieldSpec {
        key,
        label,
        kind: FieldKind::Text,
        synonyms,
        stored: true,
    }
}

const fn typed(
    key: &'static str,
    label: &'static str,
    kind: FieldKind,
    synonyms: &'static [&'static str],
) -> FieldSpec {
    FieldSpec {
        key,
        label,
        kind,
        synonyms,
        stored: true,
    }
}

const TICKET_SYNONYMS: &[&str] = &[
    "ticket",
    "ticket no",
    "ticket_no",
    "ticket number",
    "id",
    "student id",
    "student_id",
];

pub static STUDENT_SCHEMA: EntitySchema = EntitySchema {
    kind: EntityKind::Student,
    table: "students",
    fields: &[
        text("ticket_no", "Ticket No", TICKET_SYNONYMS),
        text(
            "pno",
            "PNO",
            &["pno", "personal number", "personal_number", "p number", "emp id", "emp_id"],
        ),
        text(
            "name",
            "Name",
            &["name", "student name", "full name", "student_name", "studentname", "sname"],
        ),
        text(
            "medical_policy",
            "Medical Policy",
            &["medical policy", "medical_policy", "medical", "health policy", "insurance"],
        ),
        text(
            "father_name",
            "Father Name",
            &[
                "father name",
                "father_name",
                "fathername",
                "father s name",
                "fathers name",
                "parent name",
            ],
        ),
        typed(
            "dob",
            "Date of Birth",
            FieldKind::Date,
            &[
                "dob",
                "date of birth",
                "birth date",
                "birth_date",
                "date_of_birth",
                "bday",
                "birthday",
            ],
        ),
        text(
            "gender",
            "Gender",
            &["gender", "sex", "male/female", "gender_male_female"],
        ),
        text(
            "mobile",
            "Mobile",
            &[
                "mobile",
                "mobile number",
                "mobile_number",
                "phone",
                "phone number",
                "contact",
                "contact number",
            ],
        ),
        text(
            "address",
            "Address",
            &[
                "address",
                "permanent address",
                "current address",
                "full address",
                "home address",
            ],
        ),
        text(
            "qualification_trade",
            "Qualification/Trade",
            &[
                "qualification",
                "trade",
                "qualification trade",
                "qualification_trade",
                "course",
                "field",
                "stream",
            ],
        ),
        typed(
            "passing_year",
            "Passing Year",
            FieldKind::Integer,
            &[
                "passing year",
                "passing_year",
                "passingyear",
                "year of passing",
                "graduation year",
            ],
        ),
        text(
            "college_name",
            "College Name",
            &["college", "college name", "college_name", "school", "institution", "university"],
        ),
        typed(
            "ssc_percentage",
            "SSC %",
            FieldKind::Percent,
            &["ssc", "ssc percentage", "ssc_percentage", "10th percentage", "10th %"],
        ),
        typed(
            "hsc_percentage",
            "HSC %",
            FieldKind::Percent,
            &["hsc", "hsc percentage", "hsc_percentage", "12th percentage", "12th %"],
        ),
        text(
            "aadhaar_no",
            "Aadhaar No",
            &["aadhaar", "aadhaar number", "aadhaar_no", "aadhar", "aadhar number"],
        ),
        text(
            "pan_no",
            "PAN No",
            &["pan", "pan number", "pan_no", "pan card", "pancard"],
        ),
        text(
            "email_id",
            "Email",
            &["email", "email id", "email_id", "email address", "email_address"],
        ),
        text(
            "blood_group",
            "Blood Group",
            &["blood group", "blood_group", "blood", "blood type", "blood_type"],
        ),
        text(
            "current_address_route",
            "Route",
            &[
                "current address",
                "route",
                "bus stop",
                "current_address_route",
                "address route",
                "location",
            ],
        ),
        text(
            "batch",
            "Batch",
            &[
                "batch",
                "batch no",
                "batch_no",
                "batch number",
                "class",
                "class name",
                "class_name",
                "section",
                "division",
                "year",
                "year of admission",
                "admission year",
            ],
        ),
    ],
    key: &["ticket_no"],
    required_columns: &["ticket_no", "pno", "name"],
    required_fields: &["ticket_no", "pno", "name"],
};

pub static ATTENDANCE_SCHEMA: EntitySchema = EntitySchema {
    kind: EntityKind::Attendance,
    table: "attendance",
    fields: &[
        text("ticket_no", "Ticket No", TICKET_SYNONYMS),
        FieldSpec {
            key: "student_name",
            label: "Student Name",
            kind: FieldKind::Text,
            synonyms: &["student name", "name", "student_name", "studentname", "sname", "full name"],
            stored: false,
        },
        text(
            "month",
            "Month",
            &["month", "attendance month", "month_name", "period", "attendance period"],
        ),
        typed(
            "total_days",
            "Total Days",
            FieldKind::Integer,
            &[
                "total days",
                "total_days",
                "total working days",
                "working days",
                "total_working_days",
                "days",
            ],
        ),
        typed(
            "present_days",
            "Present Days",
            FieldKind::Integer,
            &["present days", "present_days", "present", "days present", "present count"],
        ),
        typed(
            "absent_days",
            "Absent Days",
            FieldKind::Integer,
            &["absent days", "absent_days", "absent", "days absent", "absent count"],
        ),
        typed(
            "attendance_percentage",
            "Attendance %",
            FieldKind::Percent,
            &[
                "attendance percentage",
                "attendance_percentage",
                "attendance %",
                "attendance_percent",
                "percentage",
                "percent",
                "%",
            ],
        ),
    ],
    key: &["ticket_no", "month"],
    required_columns: &["ticket_no", "month", "total_days", "present_days"],
    required_fields: &[
        "ticket_no",
        "month",
        "total_days",
        "present_days",
        "attendance_percentage",
    ],
};
