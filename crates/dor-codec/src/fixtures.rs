//! Documents shared by the codec tests.

pub(crate) const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<METS:mets xmlns:METS="http://www.loc.gov/METS/" xmlns:xlink="http://www.w3.org/1999/xlink" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:oai_dc="http://www.openarchives.org/OAI/2.0/oai_dc/" OBJID="demo:5" LABEL="Sample &amp; Co" TYPE="FedoraObject" PROFILE="image">
  <METS:metsHdr CREATEDATE="2024-01-01T00:00:00.000Z" LASTMODDATE="2024-01-02T00:00:00.000Z" RECORDSTATUS="A"/>
  <METS:amdSec ID="FEDORA-AUDITTRAIL">
    <METS:digiprovMD ID="AUDREC1">
      <METS:mdWrap MIMETYPE="text/xml" MDTYPE="OTHER" LABEL="Audit Trail">
        <METS:xmlData>
          <audit:record xmlns:audit="info:fedora/fedora-system:def/audit#" ID="AUDREC1">
            <audit:process type="Fedora API-M"/>
            <audit:action>addDatastream</audit:action>
            <audit:componentID>IMG</audit:componentID>
            <audit:responsibility>fedoraAdmin</audit:responsibility>
            <audit:date>2024-01-01T12:00:00.000Z</audit:date>
            <audit:justification>initial &lt;load&gt;</audit:justification>
          </audit:record>
        </METS:xmlData>
      </METS:mdWrap>
    </METS:digiprovMD>
  </METS:amdSec>
  <METS:dmdSecFedora ID="DC" STATUS="A">
    <METS:descMD ID="DC1.0" CREATED="2024-01-01T00:00:00.000Z">
      <METS:mdWrap MIMETYPE="text/xml" MDTYPE="DC" LABEL="Dublin Core">
        <METS:xmlData><oai_dc:dc><dc:title>Foo &amp; bar</dc:title><!-- note --><dc:identifier>demo:5</dc:identifier><dc:description><![CDATA[<raw>]]></dc:description></oai_dc:dc></METS:xmlData>
      </METS:mdWrap>
    </METS:descMD>
  </METS:dmdSecFedora>
  <METS:amdSec ID="TECH" STATUS="A">
    <METS:techMD ID="TECH.0" CREATED="2024-01-01T00:00:00.000Z">
      <METS:mdWrap MIMETYPE="text/xml" MDTYPE="OTHER" LABEL="Technical">
        <METS:xmlData><tech xmlns="urn:tech" width="10"/></METS:xmlData>
      </METS:mdWrap>
    </METS:techMD>
  </METS:amdSec>
  <METS:fileSec>
    <METS:fileGrp ID="DATASTREAMS">
      <METS:fileGrp ID="IMG" STATUS="A">
        <METS:file ID="IMG.0" CREATED="2024-01-01T00:00:00.000Z" MIMETYPE="image/jpeg" OWNERID="E" SIZE="42" ADMID="TECH AUDREC1">
          <METS:FLocat LOCTYPE="URL" xlink:href="http://example.org/img.jpg" xlink:title="Image"/>
        </METS:file>
      </METS:fileGrp>
      <METS:fileGrp ID="THUMB" STATUS="A">
        <METS:file ID="THUMB.0" CREATED="2024-01-01T00:00:00.000Z" MIMETYPE="image/png" OWNERID="M">
          <METS:FContent><METS:binData>aGVs
bG8=</METS:binData></METS:FContent>
        </METS:file>
      </METS:fileGrp>
    </METS:fileGrp>
  </METS:fileSec>
  <METS:structMap ID="S1" TYPE="fedora:dsBindingMap">
    <METS:div TYPE="demo:2" LABEL="image binding">
      <METS:div TYPE="IMAGE" LABEL="main image" ORDER="0">
        <METS:fptr FILEID="IMG"/>
      </METS:div>
    </METS:div>
  </METS:structMap>
  <METS:behaviorSec ID="DISS1.0" STRUCTID="S1" BTYPE="demo:1" CREATED="2024-01-01T00:00:00.000Z" LABEL="Image behaviors" GROUPID="DISS1" STATUS="A">
    <METS:interfaceDef LABEL="bdef" LOCTYPE="URN" xlink:href="demo:1"/>
    <METS:mechanism LABEL="bmech" LOCTYPE="URN" xlink:href="demo:2"/>
  </METS:behaviorSec>
</METS:mets>
"#;
